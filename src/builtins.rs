//! The ordered registry of host functions.
//!
//! The position of a builtin in `BUILTINS` is its `GetBuiltin` operand and
//! its compile-time symbol index, so the registry must be identical between
//! compile time and run time. Builtins never abort the VM: failures come
//! back as `Value::Error`.

use std::rc::Rc;

use serde::Serialize;

use crate::value::{Builtin, HashMap, HashPair, RegexValue, Value, NULL};

/// The registry. Order is part of the bytecode contract.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "puts",
        func: builtin_puts,
    },
    Builtin {
        name: "first",
        func: builtin_first,
    },
    Builtin {
        name: "last",
        func: builtin_last,
    },
    Builtin {
        name: "rest",
        func: builtin_rest,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
    Builtin {
        name: "pop",
        func: builtin_pop,
    },
    Builtin {
        name: "upper",
        func: builtin_upper,
    },
    Builtin {
        name: "lower",
        func: builtin_lower,
    },
    Builtin {
        name: "split",
        func: builtin_split,
    },
    Builtin {
        name: "join",
        func: builtin_join,
    },
    Builtin {
        name: "abs",
        func: builtin_abs,
    },
    Builtin {
        name: "min",
        func: builtin_min,
    },
    Builtin {
        name: "max",
        func: builtin_max,
    },
    Builtin {
        name: "sqrt",
        func: builtin_sqrt,
    },
    Builtin {
        name: "regex",
        func: builtin_regex,
    },
    Builtin {
        name: "match",
        func: builtin_match,
    },
    Builtin {
        name: "replace",
        func: builtin_replace,
    },
    Builtin {
        name: "regex_split",
        func: builtin_regex_split,
    },
    Builtin {
        name: "json_parse",
        func: builtin_json_parse,
    },
    Builtin {
        name: "json_stringify",
        func: builtin_json_stringify,
    },
];

/// Look a builtin up by name.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn wrong_arity(got: usize, want: usize) -> Option<Value> {
    Some(Value::error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    )))
}

fn builtin_len(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => Some(Value::Integer(elements.len() as i64)),
        Value::String(s) => Some(Value::Integer(s.len() as i64)),
        other => Some(Value::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_puts(args: &[Value]) -> Option<Value> {
    for arg in args {
        println!("{}", arg);
    }
    None
}

fn builtin_first(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.first().cloned(),
        other => Some(Value::error(format!(
            "argument to `first` must be Array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_last(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => elements.last().cloned(),
        other => Some(Value::error(format!(
            "argument to `last` must be Array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_rest(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                None
            } else {
                Some(Value::array(elements[1..].to_vec()))
            }
        }
        other => Some(Value::error(format!(
            "argument to `rest` must be Array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_push(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut new_elements = elements.as_ref().clone();
            new_elements.push(args[1].clone());
            Some(Value::array(new_elements))
        }
        other => Some(Value::error(format!(
            "argument to `push` must be Array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_pop(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                None
            } else {
                Some(Value::array(elements[..elements.len() - 1].to_vec()))
            }
        }
        other => Some(Value::error(format!(
            "argument to `pop` must be Array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_upper(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::String(s) => Some(Value::string(s.to_uppercase())),
        other => Some(Value::error(format!(
            "argument to `upper` must be String, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_lower(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::String(s) => Some(Value::string(s.to_lowercase())),
        other => Some(Value::error(format!(
            "argument to `lower` must be String, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_split(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    let Value::String(text) = &args[0] else {
        return Some(Value::error(format!(
            "first argument to `split` must be String, got {}",
            args[0].type_name()
        )));
    };
    let Value::String(delimiter) = &args[1] else {
        return Some(Value::error(format!(
            "second argument to `split` must be String, got {}",
            args[1].type_name()
        )));
    };
    if delimiter.is_empty() {
        return Some(Value::error("delimiter cannot be empty"));
    }

    let parts = text
        .split(delimiter.as_ref())
        .map(Value::string)
        .collect();
    Some(Value::array(parts))
}

fn builtin_join(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    let Value::Array(elements) = &args[0] else {
        return Some(Value::error(format!(
            "first argument to `join` must be Array, got {}",
            args[0].type_name()
        )));
    };
    let Value::String(delimiter) = &args[1] else {
        return Some(Value::error(format!(
            "second argument to `join` must be String, got {}",
            args[1].type_name()
        )));
    };

    let parts: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
    Some(Value::string(parts.join(delimiter)))
}

fn builtin_abs(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::Integer(n) => Some(Value::Integer(n.wrapping_abs())),
        Value::Float(n) => Some(Value::Float(n.abs())),
        other => Some(Value::error(format!(
            "argument to `abs` must be Int or Float, got {}",
            other.type_name()
        ))),
    }
}

fn numeric_pair(args: &[Value], name: &str) -> Result<(f64, f64, bool), Value> {
    let as_float = |value: &Value, position: &str| match value {
        Value::Integer(n) => Ok((*n as f64, false)),
        Value::Float(n) => Ok((*n, true)),
        other => Err(Value::error(format!(
            "{} argument to `{}` must be Int or Float, got {}",
            position,
            name,
            other.type_name()
        ))),
    };

    let (a, a_float) = as_float(&args[0], "first")?;
    let (b, b_float) = as_float(&args[1], "second")?;
    Ok((a, b, a_float || b_float))
}

fn builtin_min(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    match numeric_pair(args, "min") {
        Err(error) => Some(error),
        Ok((a, b, any_float)) => {
            if any_float {
                Some(Value::Float(a.min(b)))
            } else if a < b {
                Some(args[0].clone())
            } else {
                Some(args[1].clone())
            }
        }
    }
}

fn builtin_max(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    match numeric_pair(args, "max") {
        Err(error) => Some(error),
        Ok((a, b, any_float)) => {
            if any_float {
                Some(Value::Float(a.max(b)))
            } else if a > b {
                Some(args[0].clone())
            } else {
                Some(args[1].clone())
            }
        }
    }
}

fn builtin_sqrt(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    let value = match &args[0] {
        Value::Integer(n) => *n as f64,
        Value::Float(n) => *n,
        other => {
            return Some(Value::error(format!(
                "argument to `sqrt` must be Int or Float, got {}",
                other.type_name()
            )))
        }
    };
    if value < 0.0 {
        return Some(Value::error("sqrt of negative number is not supported"));
    }
    Some(Value::Float(value.sqrt()))
}

fn builtin_regex(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    let Value::String(pattern) = &args[0] else {
        return Some(Value::error(format!(
            "argument to `regex` must be String, got {}",
            args[0].type_name()
        )));
    };

    match regex::Regex::new(pattern) {
        Ok(compiled) => Some(Value::Regex(Rc::new(RegexValue {
            pattern: pattern.to_string(),
            regex: compiled,
        }))),
        Err(error) => Some(Value::error(format!("invalid regex pattern: {}", error))),
    }
}

fn builtin_match(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    let Value::Regex(regex) = &args[0] else {
        return Some(Value::error(format!(
            "first argument to `match` must be Regex, got {}",
            args[0].type_name()
        )));
    };
    let Value::String(text) = &args[1] else {
        return Some(Value::error(format!(
            "second argument to `match` must be String, got {}",
            args[1].type_name()
        )));
    };

    // The whole match plus every capture group; absent groups come back as
    // empty strings.
    match regex.regex.captures(text) {
        None => Some(NULL),
        Some(captures) => {
            let groups = captures
                .iter()
                .map(|group| Value::string(group.map_or("", |m| m.as_str())))
                .collect();
            Some(Value::array(groups))
        }
    }
}

fn builtin_replace(args: &[Value]) -> Option<Value> {
    if args.len() != 3 {
        return wrong_arity(args.len(), 3);
    }
    let Value::String(text) = &args[0] else {
        return Some(Value::error(format!(
            "first argument to `replace` must be String, got {}",
            args[0].type_name()
        )));
    };
    let Value::Regex(regex) = &args[1] else {
        return Some(Value::error(format!(
            "second argument to `replace` must be Regex, got {}",
            args[1].type_name()
        )));
    };
    let Value::String(replacement) = &args[2] else {
        return Some(Value::error(format!(
            "third argument to `replace` must be String, got {}",
            args[2].type_name()
        )));
    };

    let result = regex.regex.replace_all(text, replacement.as_ref());
    Some(Value::string(result.into_owned()))
}

fn builtin_regex_split(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    let Value::String(text) = &args[0] else {
        return Some(Value::error(format!(
            "first argument to `regex_split` must be String, got {}",
            args[0].type_name()
        )));
    };
    let Value::Regex(regex) = &args[1] else {
        return Some(Value::error(format!(
            "second argument to `regex_split` must be Regex, got {}",
            args[1].type_name()
        )));
    };

    let parts = regex.regex.split(text).map(Value::string).collect();
    Some(Value::array(parts))
}

fn builtin_json_parse(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    let Value::String(text) = &args[0] else {
        return Some(Value::error(format!(
            "argument to `json_parse` must be String, got {}",
            args[0].type_name()
        )));
    };

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(json) => Some(json_to_value(&json)),
        Err(error) => Some(Value::error(format!("invalid JSON: {}", error))),
    }
}

fn builtin_json_stringify(args: &[Value]) -> Option<Value> {
    if args.is_empty() || args.len() > 2 {
        return Some(Value::error(format!(
            "wrong number of arguments. got={}, want=1 or 2",
            args.len()
        )));
    }

    let json = match value_to_json(&args[0]) {
        Some(json) => json,
        None => return Some(Value::error("cannot convert value to JSON")),
    };

    let rendered = if args.len() == 2 {
        let Value::String(indent) = &args[1] else {
            return Some(Value::error(format!(
                "second argument to `json_stringify` must be String, got {}",
                args[1].type_name()
            )));
        };
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        if json.serialize(&mut serializer).is_err() {
            return Some(Value::error("cannot convert value to JSON"));
        }
        String::from_utf8(out).ok()?
    } else {
        match serde_json::to_string(&json) {
            Ok(s) => s,
            Err(error) => return Some(Value::error(format!("JSON stringify error: {}", error))),
        }
    };

    Some(Value::string(rendered))
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => NULL,
        serde_json::Value::Bool(b) => Value::from_native_bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(elements) => {
            Value::array(elements.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(entries) => {
            let mut pairs = HashMap::new();
            for (key, value) in entries {
                let key_value = Value::string(key.clone());
                let hash_key = key_value.hash_key().expect("strings are hashable");
                pairs.insert(
                    hash_key,
                    HashPair {
                        key: key_value,
                        value: json_to_value(value),
                    },
                );
            }
            Value::Hash(Rc::new(pairs))
        }
    }
}

fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::Null => Some(serde_json::Value::Null),
        Value::Boolean(b) => Some(serde_json::Value::Bool(*b)),
        Value::Integer(n) => Some(serde_json::Value::Number((*n).into())),
        Value::Float(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
        Value::String(s) => Some(serde_json::Value::String(s.to_string())),
        Value::Array(elements) => {
            let mut out = Vec::with_capacity(elements.len());
            for element in elements.iter() {
                out.push(value_to_json(element)?);
            }
            Some(serde_json::Value::Array(out))
        }
        Value::Hash(pairs) => {
            let mut out = serde_json::Map::new();
            for (_, pair) in pairs.iter() {
                out.insert(pair.key.to_string(), value_to_json(&pair.value)?);
            }
            Some(serde_json::Value::Object(out))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> Option<Value> {
        (lookup(name).expect("builtin not found").func)(args)
    }

    fn error_message(result: Option<Value>) -> String {
        match result {
            Some(Value::Error(message)) => message.to_string(),
            other => panic!("expected error value, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_order_is_stable() {
        assert_eq!(BUILTINS[0].name, "len");
        assert_eq!(BUILTINS[1].name, "puts");
        assert_eq!(BUILTINS[5].name, "push");
        assert!(lookup("len").is_some());
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn test_len() {
        assert_eq!(
            call("len", &[Value::string("hello")]),
            Some(Value::Integer(5))
        );
        assert_eq!(
            call("len", &[Value::array(vec![Value::Integer(1)])]),
            Some(Value::Integer(1))
        );
        assert_eq!(
            error_message(call("len", &[Value::Integer(1)])),
            "argument to `len` not supported, got Int"
        );
        assert_eq!(
            error_message(call("len", &[])),
            "wrong number of arguments. got=0, want=1"
        );
    }

    #[test]
    fn test_array_accessors() {
        let arr = Value::array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);

        assert_eq!(call("first", &[arr.clone()]), Some(Value::Integer(1)));
        assert_eq!(call("last", &[arr.clone()]), Some(Value::Integer(3)));

        let rest = call("rest", &[arr.clone()]).unwrap();
        assert_eq!(rest.to_string(), "[2, 3]");

        let empty = Value::array(vec![]);
        assert_eq!(call("first", &[empty.clone()]), None);
        assert_eq!(call("last", &[empty.clone()]), None);
        assert_eq!(call("rest", &[empty.clone()]), None);
        assert_eq!(call("pop", &[empty]), None);
    }

    #[test]
    fn test_push_and_pop_are_pure() {
        let arr = Value::array(vec![Value::Integer(1)]);
        let pushed = call("push", &[arr.clone(), Value::Integer(2)]).unwrap();
        assert_eq!(pushed.to_string(), "[1, 2]");
        assert_eq!(arr.to_string(), "[1]");

        let popped = call("pop", &[pushed]).unwrap();
        assert_eq!(popped.to_string(), "[1]");
    }

    #[test]
    fn test_string_case() {
        assert_eq!(
            call("upper", &[Value::string("gIbBoN")]),
            Some(Value::string("GIBBON"))
        );
        assert_eq!(
            call("lower", &[Value::string("CAFÉ")]),
            Some(Value::string("café"))
        );
        assert_eq!(
            error_message(call("upper", &[Value::Integer(1)])),
            "argument to `upper` must be String, got Int"
        );
    }

    #[test]
    fn test_split() {
        let result = call("split", &[Value::string("a,,b"), Value::string(",")]).unwrap();
        assert_eq!(result.to_string(), "[a, , b]");

        let result = call(
            "split",
            &[Value::string("one::two"), Value::string("::")],
        )
        .unwrap();
        assert_eq!(result.to_string(), "[one, two]");

        assert_eq!(
            error_message(call("split", &[Value::string("abc"), Value::string("")])),
            "delimiter cannot be empty"
        );
    }

    #[test]
    fn test_join() {
        let arr = Value::array(vec![
            Value::Integer(1),
            Value::string("hello"),
            Value::Boolean(true),
        ]);
        assert_eq!(
            call("join", &[arr, Value::string(",")]),
            Some(Value::string("1,hello,true"))
        );

        let empty = Value::array(vec![]);
        assert_eq!(
            call("join", &[empty, Value::string(",")]),
            Some(Value::string(""))
        );
    }

    #[test]
    fn test_numeric_builtins() {
        assert_eq!(call("abs", &[Value::Integer(-5)]), Some(Value::Integer(5)));
        assert_eq!(call("abs", &[Value::Float(-3.14)]), Some(Value::Float(3.14)));

        assert_eq!(
            call("min", &[Value::Integer(3), Value::Integer(7)]),
            Some(Value::Integer(3))
        );
        // Mixed int/float promotes to float.
        assert_eq!(
            call("max", &[Value::Integer(3), Value::Float(2.5)]),
            Some(Value::Float(3.0))
        );

        assert_eq!(call("sqrt", &[Value::Integer(9)]), Some(Value::Float(3.0)));
        assert_eq!(
            error_message(call("sqrt", &[Value::Integer(-1)])),
            "sqrt of negative number is not supported"
        );
    }

    #[test]
    fn test_regex_match_and_replace() {
        let regex = call("regex", &[Value::string(r"(\d+)-(\d+)")]).unwrap();
        assert!(matches!(regex, Value::Regex(_)));

        let matched = call("match", &[regex.clone(), Value::string("10-20")]).unwrap();
        assert_eq!(matched.to_string(), "[10-20, 10, 20]");

        assert_eq!(
            call("match", &[regex.clone(), Value::string("no digits")]),
            Some(NULL)
        );

        let replaced = call(
            "replace",
            &[Value::string("1-2 3-4"), regex.clone(), Value::string("x")],
        )
        .unwrap();
        assert_eq!(replaced, Value::string("x x"));

        let split = call("regex_split", &[Value::string("a1b22c"), {
            call("regex", &[Value::string(r"\d+")]).unwrap()
        }])
        .unwrap();
        assert_eq!(split.to_string(), "[a, b, c]");

        assert!(error_message(call("regex", &[Value::string("(")]))
            .starts_with("invalid regex pattern"));
    }

    #[test]
    fn test_json_roundtrip() {
        let parsed = call(
            "json_parse",
            &[Value::string(r#"{"a": 1, "b": [true, null, 2.5]}"#)],
        )
        .unwrap();
        assert_eq!(parsed.to_string(), "{a: 1, b: [true, null, 2.5]}");

        let rendered = call("json_stringify", &[parsed]).unwrap();
        assert_eq!(
            rendered,
            Value::string(r#"{"a":1,"b":[true,null,2.5]}"#)
        );

        assert!(error_message(call("json_parse", &[Value::string("{oops")]))
            .starts_with("invalid JSON"));
    }
}
