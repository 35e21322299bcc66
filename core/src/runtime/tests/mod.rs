mod helpers;

mod async_tests;
mod builtin_tests;
mod object_tests;
mod trace_tests;
