//! Object model: integrity levels, accessors and caller-owned objects

use super::helpers::{error_message, eval_json, run_with};
use crate::runtime::{Context, Value};
use serde_json::json;

fn with_person() -> Context {
    Context::new().with("person", Value::object([("name", Value::from("Jane"))]))
}

/* ===================== Integrity Levels ===================== */

#[tokio::test]
async fn test_seal_blocks_additions_but_allows_writes() {
    let source = "const o = { name: 'Jane' }
Object.seal(o)
o.name = 'John'
try {
  o.age = 33
} catch (e) {
  return [o, e.message, Object.isSealed(o), Object.isFrozen(o)]
}";
    assert_eq!(
        eval_json(source).await,
        json!([{"name": "John"}, "Cannot add property age, object is not extensible", true, false])
    );
}

#[tokio::test]
async fn test_sealed_properties_cannot_be_deleted() {
    let source = "const o = { name: 'Jane' }\nObject.seal(o)\ndelete o.name";
    assert_eq!(error_message(source).await, "Cannot delete property 'name' of #<Object>");
}

#[tokio::test]
async fn test_prevent_extensions_is_silent() {
    let source = "const o = { name: 'Jane' }
Object.preventExtensions(o)
o.age = 33
const before = Object.keys(o)
delete o.name
return [before, o, Object.isExtensible(o)]";
    assert_eq!(eval_json(source).await, json!([["name"], {}, false]));
}

#[tokio::test]
async fn test_frozen_objects_reject_writes() {
    let source = "const o = Object.freeze({ name: 'Jane' })\no.name = 'John'";
    assert_eq!(
        error_message(source).await,
        "Cannot assign to read only property 'name' of object"
    );
}

#[tokio::test]
async fn test_frozen_arrays_reject_push() {
    let source = "const list = Object.freeze([1, 2])\ntry {\n  list.push(3)\n} catch (e) {\n  return [list, e instanceof TypeError]\n}";
    assert_eq!(eval_json(source).await, json!([[1, 2], true]));
}

/* ===================== Accessors ===================== */

#[tokio::test]
async fn test_getters_and_setters_run_in_order() {
    let source = "const calls = []
const o = {
  _v: 1,
  get v() { calls.push('get'); return 10 },
  set v(x) { calls.push('set ' + x) },
}
o.v = 5
const read = o.v
return [read, calls]";
    assert_eq!(eval_json(source).await, json!([10, ["set 5", "get"]]));
}

#[tokio::test]
async fn test_define_property_accessor() {
    let source = "const o = {}
let stored = 0
Object.defineProperty(o, 'value', {
  get: () => stored * 2,
  set: (x) => { stored = x },
  enumerable: false,
})
o.value = 4
return [o.value, Object.keys(o)]";
    assert_eq!(eval_json(source).await, json!([8, []]));
}

#[tokio::test]
async fn test_define_property_read_only() {
    let source = "const o = {}
Object.defineProperty(o, 'id', { value: 7 })
try {
  o.id = 8
} catch (e) {
  return [o.id, e.message]
}";
    assert_eq!(
        eval_json(source).await,
        json!([7, "Cannot assign to read only property 'id' of object"])
    );
}

#[tokio::test]
async fn test_throwing_setter_keeps_earlier_effects() {
    let context = with_person();
    let source = "person.name = 'Ann'
const guard = { set locked(v) { throw new Error('locked') } }
guard.locked = true
person.name = 'never'";
    let result = run_with(source, context).await;
    assert_eq!(result.thrown().message(), "locked");
    assert_eq!(
        result.context.get("person").and_then(|v| v.to_json()),
        Some(json!({"name": "Ann"}))
    );
}

/* ===================== Caller Objects ===================== */

#[tokio::test]
async fn test_mutations_land_on_caller_objects() {
    let context = with_person();
    let original = context.get("person").unwrap();
    let result = run_with("person.age = 30\nperson.tags = ['a']", context).await;
    assert!(result.result.is_ok());
    assert_eq!(original.to_json(), Some(json!({"name": "Jane", "age": 30, "tags": ["a"]})));
}

#[tokio::test]
async fn test_caller_sealed_object_rejects_additions() {
    let context = with_person();
    crate::runtime::object::seal(&context.get("person").unwrap());
    let result = run_with("person.age = 33", context).await;
    assert_eq!(
        result.thrown().message(),
        "Cannot add property age, object is not extensible"
    );
    assert_eq!(
        result.context.get("person").and_then(|v| v.to_json()),
        Some(json!({"name": "Jane"}))
    );
}

#[tokio::test]
async fn test_key_order_is_insertion_order() {
    let source = "const o = { b: 1, a: 2 }\no.c = 3\ndelete o.b\no.b = 4\nreturn Object.keys(o)";
    assert_eq!(eval_json(source).await, json!(["a", "c", "b"]));
}

#[tokio::test]
async fn test_in_and_has_own_property() {
    let source = "const o = { a: undefined }\nreturn ['a' in o, 'b' in o, o.hasOwnProperty('a'), 0 in [5]]";
    assert_eq!(eval_json(source).await, json!([true, false, true, true]));
}

#[tokio::test]
async fn test_reading_from_null_fails() {
    assert_eq!(
        error_message("const o = null\nreturn o.name").await,
        "Cannot read properties of null (reading 'name')"
    );
}
