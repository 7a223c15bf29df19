//! JSON 字段探测
//!
//! 上游和客户端的 JSON 只在顶层结构上严格校验；可选子字段按
//! "存在 / 缺失 / 类型错误" 三态探测，类型错误的字段记录日志后跳过。

use serde_json::Value;

/// 字段探测结果
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Present(T),
    Absent,
    /// 字段存在但类型不符合预期
    Invalid(&'static str),
}

impl<T> Field<T> {
    /// 转为 `Option`，类型错误时记录 debug 日志
    pub fn ok(self, path: &str) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent => None,
            Field::Invalid(expected) => {
                tracing::debug!("[TRANSLATOR] 跳过字段 {}: 期望 {}", path, expected);
                None
            }
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Field::Present(_))
    }
}

fn probe<'a, T>(
    value: &'a Value,
    key: &str,
    expected: &'static str,
    extract: impl FnOnce(&'a Value) -> Option<T>,
) -> Field<T> {
    match value.get(key) {
        None | Some(Value::Null) => Field::Absent,
        Some(v) => match extract(v) {
            Some(t) => Field::Present(t),
            None => Field::Invalid(expected),
        },
    }
}

pub fn str_field<'a>(value: &'a Value, key: &str) -> Field<&'a str> {
    probe(value, key, "string", Value::as_str)
}

pub fn u64_field(value: &Value, key: &str) -> Field<u64> {
    probe(value, key, "unsigned integer", Value::as_u64)
}

pub fn f64_field(value: &Value, key: &str) -> Field<f64> {
    probe(value, key, "number", Value::as_f64)
}

pub fn bool_field(value: &Value, key: &str) -> Field<bool> {
    probe(value, key, "boolean", Value::as_bool)
}

pub fn array_field<'a>(value: &'a Value, key: &str) -> Field<&'a Vec<Value>> {
    probe(value, key, "array", Value::as_array)
}

pub fn object_field<'a>(value: &'a Value, key: &str) -> Field<&'a Value> {
    probe(value, key, "object", |v| v.is_object().then_some(v))
}

/// 读取字符串字段，缺失或类型错误时返回空串
pub fn str_or_empty<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

/// 把任意 JSON 值转为文本：字符串原样返回，null 为空，其他序列化
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_probe_states() {
        let v = json!({"a": "x", "b": 3, "c": null, "d": [1]});
        assert_eq!(str_field(&v, "a"), Field::Present("x"));
        assert_eq!(str_field(&v, "b"), Field::Invalid("string"));
        assert_eq!(str_field(&v, "c"), Field::Absent);
        assert_eq!(str_field(&v, "missing"), Field::Absent);
        assert_eq!(u64_field(&v, "b"), Field::Present(3));
        assert!(array_field(&v, "d").is_present());
        assert!(object_field(&v, "d").ok("d").is_none());
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("hi")), "hi");
        assert_eq!(value_to_text(&Value::Null), "");
        assert_eq!(value_to_text(&json!({"k": 1})), "{\"k\":1}");
    }
}
