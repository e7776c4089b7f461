//! Configuration data injected into the compiler from outside: the curated
//! mapping of blocking-function names to parameter lists (spec §6).

use std::collections::HashMap;

/// `name ∈ {parallel, retry_policy, call_step}` recognised by literal name,
/// never resolved against a symbol table (spec GLOSSARY "Intrinsic").
pub const INTRINSIC_PARALLEL: &str = "parallel";
pub const INTRINSIC_RETRY_POLICY: &str = "retry_policy";
pub const INTRINSIC_CALL_STEP: &str = "call_step";

pub fn is_intrinsic(name: &str) -> bool {
    matches!(
        name,
        INTRINSIC_PARALLEL | INTRINSIC_RETRY_POLICY | INTRINSIC_CALL_STEP
    )
}

/// A fully-qualified name whose call lowers to an explicit `Call` step with
/// named arguments rather than an inline expression (spec GLOSSARY
/// "Blocking function").
#[derive(Debug, Clone)]
pub struct BlockingFunctions {
    params: HashMap<String, Vec<String>>,
}

impl BlockingFunctions {
    pub fn new(params: HashMap<String, Vec<String>>) -> Self {
        Self { params }
    }

    /// The curated default set from spec §6's own examples.
    pub fn defaults() -> Self {
        let mut params = HashMap::new();
        params.insert("http.get".to_string(), vec!["url".to_string()]);
        params.insert(
            "http.post".to_string(),
            vec!["url".to_string(), "body".to_string()],
        );
        params.insert("sys.log".to_string(), vec!["text".to_string()]);
        params.insert("sys.get_env".to_string(), vec!["name".to_string()]);
        Self { params }
    }

    pub fn param_names(&self, function_name: &str) -> Option<&[String]> {
        self.params.get(function_name).map(Vec::as_slice)
    }

    pub fn is_blocking(&self, function_name: &str) -> bool {
        self.params.contains_key(function_name)
    }
}

impl Default for BlockingFunctions {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_documented_examples() {
        let table = BlockingFunctions::defaults();
        assert!(table.is_blocking("http.get"));
        assert!(table.is_blocking("sys.log"));
        assert!(!table.is_blocking("math.sqrt"));
        assert_eq!(table.param_names("http.post"), Some(&["url".to_string(), "body".to_string()][..]));
    }
}
