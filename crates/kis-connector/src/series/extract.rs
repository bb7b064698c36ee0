//! 응답 트리에서 필드 값을 찾고 숫자로 정규화합니다.
//!
//! 업스트림 응답 구조가 계정/문서 버전마다 달라 위치를 가정하지 않습니다.
//! 키는 대소문자를 무시하고 비교하며, 중첩 객체/배열을 깊이 우선으로 탐색합니다.
//! 이미 방문한 노드와 `MAX_DEPTH`를 넘는 노드는 건너뛰므로 자기 참조 트리에서도 종료됩니다.

use serde_json::Value;
use std::collections::HashSet;

/// 탐색 최대 깊이.
pub const MAX_DEPTH: usize = 64;

/// 탐색 가능한 트리 노드.
pub trait JsonTree {
    /// 객체 노드의 (키, 자식) 목록. 객체가 아니면 `None`.
    fn object_entries(&self) -> Option<Vec<(&str, &Self)>>;

    /// 배열 노드의 원소 목록. 배열이 아니면 `None`.
    fn array_items(&self) -> Option<Vec<&Self>>;

    /// 스칼라 노드의 값. 객체/배열이면 `None`.
    fn scalar(&self) -> Option<FieldValue>;
}

/// 추출된 원시 값.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// 정규화된 값.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// 유한한 숫자
    Number(f64),
    /// 값은 있으나 숫자가 아님 (원문 보존)
    NonNumeric(String),
    /// null 또는 공백 문자열
    Blank,
}

impl Normalized {
    /// 값이 존재하는지 (숫자 여부와 무관).
    pub fn is_present(&self) -> bool {
        !matches!(self, Normalized::Blank)
    }
}

impl JsonTree for Value {
    fn object_entries(&self) -> Option<Vec<(&str, &Self)>> {
        self.as_object()
            .map(|map| map.iter().map(|(k, v)| (k.as_str(), v)).collect())
    }

    fn array_items(&self) -> Option<Vec<&Self>> {
        self.as_array().map(|items| items.iter().collect())
    }

    fn scalar(&self) -> Option<FieldValue> {
        match self {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// 트리 전체에서 `key`의 첫 스칼라 값을 찾습니다.
///
/// 각 객체에서 직접 키를 먼저 확인한 뒤 배열 원소, 자식 객체 순으로 내려갑니다.
/// 키가 일치해도 값이 객체/배열이면 일치로 보지 않고 계속 탐색합니다.
pub fn find_field<T: JsonTree + ?Sized>(root: &T, key: &str) -> Option<FieldValue> {
    let target = key.trim().to_lowercase();
    let mut visited = HashSet::new();
    search(root, &target, 0, &mut visited)
}

/// 컨테이너 우선순위에 따라 필드를 찾습니다.
///
/// `containers` 순서대로 최상위 키를 찾아 그 안을 먼저 탐색하고, 모두 실패하면 전체 트리를 탐색합니다.
pub fn extract_field<T: JsonTree + ?Sized>(
    root: &T,
    containers: &[String],
    key: &str,
) -> Option<FieldValue> {
    let entries = root.object_entries().unwrap_or_default();

    for container in containers {
        let child = entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(container))
            .map(|(_, v)| *v);

        if let Some(found) = child.and_then(|c| find_field(c, key)) {
            return Some(found);
        }
    }

    find_field(root, key)
}

fn search<T: JsonTree + ?Sized>(
    node: &T,
    target: &str,
    depth: usize,
    visited: &mut HashSet<usize>,
) -> Option<FieldValue> {
    if depth > MAX_DEPTH {
        return None;
    }
    // 노드 주소로 동일성 판단
    let id = node as *const T as *const () as usize;
    if !visited.insert(id) {
        return None;
    }

    if let Some(entries) = node.object_entries() {
        for (k, v) in &entries {
            if k.to_lowercase() == target {
                if let Some(value) = v.scalar() {
                    return Some(value);
                }
            }
        }
        for (_, v) in entries {
            if v.scalar().is_none() {
                if let Some(found) = search(v, target, depth + 1, visited) {
                    return Some(found);
                }
            }
        }
        return None;
    }

    if let Some(items) = node.array_items() {
        for item in items {
            if let Some(found) = search(item, target, depth + 1, visited) {
                return Some(found);
            }
        }
    }

    None
}

/// 추출 값을 숫자로 정규화.
///
/// 문자열은 쉼표와 공백을 제거한 뒤 파싱합니다 (`"1,234 "` → `1234`).
pub fn normalize(value: &FieldValue) -> Normalized {
    match value {
        FieldValue::Null => Normalized::Blank,
        FieldValue::Number(n) if n.is_finite() => Normalized::Number(*n),
        FieldValue::Number(n) => Normalized::NonNumeric(n.to_string()),
        FieldValue::Bool(b) => Normalized::NonNumeric(b.to_string()),
        FieldValue::Text(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| *c != ',' && !c.is_whitespace())
                .collect();
            if cleaned.is_empty() {
                return Normalized::Blank;
            }
            match cleaned.parse::<f64>() {
                Ok(n) if n.is_finite() => Normalized::Number(n),
                _ => Normalized::NonNumeric(s.trim().to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::OnceCell;
    use std::rc::Rc;

    fn containers() -> Vec<String> {
        ["output2", "output", "output1", "data", "result"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_case_insensitive_match() {
        let payload = json!({"output": {"FRGN_SHNU_VOL": "10"}});
        assert_eq!(
            find_field(&payload, "frgn_shnu_vol"),
            Some(FieldValue::Text("10".into()))
        );
    }

    #[test]
    fn test_container_priority() {
        let payload = json!({
            "output": [{"frgn_shnu_vol": "1"}],
            "output2": [{"frgn_shnu_vol": "2"}],
        });
        assert_eq!(
            extract_field(&payload, &containers(), "frgn_shnu_vol"),
            Some(FieldValue::Text("2".into()))
        );
    }

    #[test]
    fn test_falls_back_to_whole_payload() {
        let payload = json!({"meta": {"nested": [{"x": 1}, {"frgn_seln_vol": 42}]}});
        assert_eq!(
            extract_field(&payload, &containers(), "frgn_seln_vol"),
            Some(FieldValue::Number(42.0))
        );
    }

    #[test]
    fn test_container_value_is_not_a_match() {
        let payload = json!({"output": {"target": {"target": "7"}}});
        assert_eq!(find_field(&payload, "target"), Some(FieldValue::Text("7".into())));
    }

    #[test]
    fn test_missing_field() {
        let payload = json!({"rt_cd": "0", "output2": []});
        assert_eq!(extract_field(&payload, &containers(), "frgn_shnu_vol"), None);
    }

    #[test]
    fn test_normalize_strings() {
        assert_eq!(
            normalize(&FieldValue::Text("1,234 ".into())),
            Normalized::Number(1234.0)
        );
        assert_eq!(
            normalize(&FieldValue::Text(" -5,000.5".into())),
            Normalized::Number(-5000.5)
        );
        assert_eq!(
            normalize(&FieldValue::Text("N/A".into())),
            Normalized::NonNumeric("N/A".into())
        );
        assert_eq!(normalize(&FieldValue::Text("  ".into())), Normalized::Blank);
        assert_eq!(normalize(&FieldValue::Null), Normalized::Blank);
        assert_eq!(normalize(&FieldValue::Number(3.0)), Normalized::Number(3.0));
    }

    #[test]
    fn test_nan_text_is_non_numeric() {
        assert!(matches!(
            normalize(&FieldValue::Text("NaN".into())),
            Normalized::NonNumeric(_)
        ));
        assert!(matches!(
            normalize(&FieldValue::Text("inf".into())),
            Normalized::NonNumeric(_)
        ));
    }

    #[test]
    fn test_depth_bound_terminates() {
        let mut value = json!({"leaf": "1"});
        for _ in 0..(MAX_DEPTH * 2) {
            value = json!({ "next": value });
        }
        assert_eq!(find_field(&value, "leaf"), None);
    }

    /// 자기 참조가 가능한 테스트용 노드.
    #[derive(Default)]
    struct Node {
        entries: OnceCell<Vec<(String, Rc<Node>)>>,
    }

    impl JsonTree for Node {
        fn object_entries(&self) -> Option<Vec<(&str, &Self)>> {
            Some(
                self.entries
                    .get()
                    .map(|e| e.iter().map(|(k, v)| (k.as_str(), v.as_ref())).collect())
                    .unwrap_or_default(),
            )
        }

        fn array_items(&self) -> Option<Vec<&Self>> {
            None
        }

        fn scalar(&self) -> Option<FieldValue> {
            None
        }
    }

    #[test]
    fn test_cyclic_tree_terminates() {
        let root = Rc::new(Node::default());
        let child = Rc::new(Node::default());

        let _ = child.entries.set(vec![("parent".into(), Rc::clone(&root))]);
        let _ = root.entries.set(vec![
            ("child".into(), Rc::clone(&child)),
            ("self".into(), Rc::clone(&root)),
        ]);

        assert_eq!(find_field(root.as_ref(), "frgn_shnu_vol"), None);
        assert_eq!(extract_field(root.as_ref(), &containers(), "child"), None);
    }
}
