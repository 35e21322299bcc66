//! Builtin objects and methods

use super::helpers::{error_message, eval_json};
use serde_json::json;

/* ===================== Arrays ===================== */

#[tokio::test]
async fn test_array_callbacks() {
    let source = "const xs = [1, 2, 3, 4]
return [
  xs.map(x => x * 10),
  xs.filter(x => x % 2 === 0),
  xs.reduce((acc, x) => acc + x, 0),
  xs.find(x => x > 2),
  xs.findIndex(x => x > 2),
  xs.some(x => x > 3),
  xs.every(x => x > 3),
]";
    assert_eq!(
        eval_json(source).await,
        json!([[10, 20, 30, 40], [2, 4], 10, 3, 2, true, false])
    );
}

#[tokio::test]
async fn test_array_sorting() {
    let source = "return [[3, 1, 2].sort(), [10, 9, 1].sort(), [1, 3, 2].sort((a, b) => b - a)]";
    assert_eq!(eval_json(source).await, json!([[1, 2, 3], [1, 10, 9], [3, 2, 1]]));
}

#[tokio::test]
async fn test_array_mutators() {
    let source = "const xs = [1, 2, 3, 4, 5]
const removed = xs.splice(1, 2, 'a')
xs.unshift(0)
const last = xs.pop()
const first = xs.shift()
return [xs, removed, last, first, xs.length]";
    assert_eq!(eval_json(source).await, json!([[1, "a", 4], [2, 3], 5, 0, 3]));
}

#[tokio::test]
async fn test_array_accessors() {
    let source = "const xs = [1, [2, [3]], 4]
return [
  xs.slice(1),
  xs.flat(),
  xs.flat(2),
  [1, 2].flatMap(x => [x, x]),
  xs.includes(4),
  xs.indexOf(4),
  ['a', null, 'b'].join('-'),
  [1, 2, 3].at(-1),
  [1, 2].concat([3], 4),
]";
    assert_eq!(
        eval_json(source).await,
        json!([
            [[2, [3]], 4],
            [1, 2, [3], 4],
            [1, 2, 3, 4],
            [1, 1, 2, 2],
            true,
            2,
            "a--b",
            3,
            [1, 2, 3, 4]
        ])
    );
}

#[tokio::test]
async fn test_array_statics() {
    let source = "return [Array.isArray([]), Array.isArray({}), Array.from('ab'), new Array(2).length]";
    assert_eq!(eval_json(source).await, json!([true, false, ["a", "b"], 2]));
}

#[tokio::test]
async fn test_array_length_assignment_truncates() {
    assert_eq!(eval_json("const xs = [1, 2, 3]\nxs.length = 1\nreturn xs").await, json!([1]));
}

/* ===================== Strings ===================== */

#[tokio::test]
async fn test_string_methods() {
    let source = "const s = '  Hello, World  '
const t = s.trim()
return [
  t.toUpperCase(),
  t.split(', '),
  t.slice(0, 5),
  t.replace('l', 'L'),
  t.replaceAll('l', 'L'),
  t.includes('World'),
  t.startsWith('Hell'),
  '7'.padStart(3, '0'),
  'ab'.repeat(2),
  'héllo'.length,
  t.indexOf('o'),
  t.lastIndexOf('o'),
]";
    assert_eq!(
        eval_json(source).await,
        json!([
            "HELLO, WORLD",
            ["Hello", "World"],
            "Hello",
            "HeLlo, World",
            "HeLLo, WorLd",
            true,
            true,
            "007",
            "abab",
            5,
            4,
            8
        ])
    );
}

/* ===================== Numbers and Math ===================== */

#[tokio::test]
async fn test_number_conversions() {
    let source = "return [
  parseInt('42px'),
  parseInt('0x1f'),
  parseInt('101', 2),
  parseFloat('3.5kg'),
  Number('12'),
  Number(''),
  isNaN(Number('abc')),
  (3.14159).toFixed(2),
  (255).toString(16),
  String(12),
  Boolean(''),
]";
    assert_eq!(
        eval_json(source).await,
        json!([42, 31, 5, 3.5, 12, 0, true, "3.14", "ff", "12", false])
    );
}

#[tokio::test]
async fn test_math() {
    let source = "return [Math.floor(2.7), Math.ceil(2.1), Math.round(2.5), Math.round(-2.5), Math.max(1, 5, 3), Math.min(), Math.abs(-4)]";
    let result = eval_json(source).await;
    assert_eq!(result[0], json!(2));
    assert_eq!(result[1], json!(3));
    assert_eq!(result[2], json!(3));
    assert_eq!(result[3], json!(-2));
    assert_eq!(result[4], json!(5));
    assert_eq!(result[6], json!(4));
}

#[tokio::test]
async fn test_math_random_in_range() {
    let source = "const r = Math.random()\nreturn r >= 0 && r < 1";
    assert_eq!(eval_json(source).await, json!(true));
}

#[tokio::test]
async fn test_to_fixed_range() {
    assert_eq!(
        error_message("return (1).toFixed(101)").await,
        "toFixed() digits argument must be between 0 and 100"
    );
}

/* ===================== JSON ===================== */

#[tokio::test]
async fn test_json_round_trip() {
    let source = "const text = JSON.stringify({ a: [1, { b: null }], u: undefined, f: () => 1 })
const back = JSON.parse('{\"x\": [1, 2]}')
return [text, back.x[1]]";
    assert_eq!(eval_json(source).await, json!(["{\"a\":[1,{\"b\":null}]}", 2]));
}

#[tokio::test]
async fn test_json_parse_failure_is_catchable() {
    let source = "try {\n  JSON.parse('{nope')\n} catch (e) {\n  return e.name\n}";
    assert_eq!(eval_json(source).await, json!("SyntaxError"));
}

/* ===================== Objects ===================== */

#[tokio::test]
async fn test_object_statics() {
    let source = "const o = { a: 1, b: 2 }
return [
  Object.keys(o),
  Object.values(o),
  Object.entries(o),
  Object.fromEntries([['x', 1]]),
  Object.assign({}, o, { c: 3 }),
]";
    assert_eq!(
        eval_json(source).await,
        json!([["a", "b"], [1, 2], [["a", 1], ["b", 2]], {"x": 1}, {"a": 1, "b": 2, "c": 3}])
    );
}

/* ===================== Errors and Dates ===================== */

#[tokio::test]
async fn test_error_constructors() {
    let source = "const e = new TypeError('bad input')
const plain = Error('no new')
return [e.name, e.message, e instanceof TypeError, e instanceof Error, plain.message]";
    assert_eq!(
        eval_json(source).await,
        json!(["TypeError", "bad input", true, true, "no new"])
    );
}

#[tokio::test]
async fn test_dates() {
    let source = "const d = new Date('2024-01-02T03:04:05Z')
return [d.toISOString(), new Date(0).toISOString(), d.getTime(), typeof Date.now()]";
    assert_eq!(
        eval_json(source).await,
        json!([
            "2024-01-02T03:04:05.000Z",
            "1970-01-01T00:00:00.000Z",
            1704164645000i64,
            "number"
        ])
    );
}

#[tokio::test]
async fn test_invalid_date_to_iso_fails() {
    assert_eq!(
        error_message("return new Date('not a date').toISOString()").await,
        "Invalid time value"
    );
}

#[tokio::test]
async fn test_date_past_time_limit_fails() {
    assert_eq!(
        error_message("return new Date(8.64e15 + 1).toISOString()").await,
        "Invalid time value"
    );
    assert_eq!(
        eval_json("return [new Date(8.64e15 + 1).getTime(), JSON.stringify({ at: new Date(NaN) })]").await,
        json!([null, "{\"at\":null}"])
    );
}

/* ===================== Size Limits ===================== */

/// `name: message` of the error `statement` throws, caught inside the script
async fn caught(statement: &str) -> serde_json::Value {
    eval_json(&format!(
        "try {{\n  {}\n}} catch (e) {{\n  return e.name + ': ' + e.message\n}}\nreturn 'no error'",
        statement
    ))
    .await
}

#[tokio::test]
async fn test_oversized_strings_are_catchable() {
    assert_eq!(caught("'ab'.repeat(2 ** 62)").await, json!("RangeError: Invalid string length"));
    assert_eq!(caught("'x'.padStart(2 ** 40)").await, json!("RangeError: Invalid string length"));
    assert_eq!(caught("'x'.padEnd(2 ** 40, 'ab')").await, json!("RangeError: Invalid string length"));
    assert_eq!(caught("''.repeat(2 ** 62)").await, json!("no error"));
}

#[tokio::test]
async fn test_oversized_arrays_are_catchable() {
    assert_eq!(caught("const a = []; a[4294967294] = 1").await, json!("RangeError: Invalid array length"));
    assert_eq!(caught("const a = []; a.length = 2 ** 31").await, json!("RangeError: Invalid array length"));
    assert_eq!(caught("Array(2 ** 31)").await, json!("RangeError: Invalid array length"));
    assert_eq!(caught("Array.from({ length: 2 ** 40 })").await, json!("RangeError: Invalid array length"));
    assert_eq!(
        eval_json("const a = [1]\ntry {\n  a[2 ** 30] = 2\n} catch (e) {}\nreturn a").await,
        json!([1])
    );
}
