//! Index key derivation. Pure functions, no storage access.

use crate::keys::{concatenated_key, CATCH_ALL_KEY};
use crate::types::{Filter, FilterRule, Operand};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Keys of one rule; most rules carry a handful of values.
pub type RuleKeys = SmallVec<[String; 4]>;

/// Index keys contributed by one rule.
///
/// Exactly one side must be dynamic: `~elem` with a literal value gives
/// `type:elem:value`, a literal element with `~value` gives `type:value:elem`.
pub fn rule_keys(rule: &FilterRule) -> RuleKeys {
    let mut keys = RuleKeys::new();
    if !rule.rule_type.is_indexable() {
        return keys;
    }
    let type_name = rule.rule_type.as_str();
    let rule_type: &str = &type_name;
    let element = rule.element_operand();
    for value in rule.value_operands() {
        let key = match (element, value) {
            (Operand::Dynamic(field), Operand::Static(val)) => concatenated_key(&[rule_type, field, val]),
            (Operand::Static(elem), Operand::Dynamic(field)) => concatenated_key(&[rule_type, field, elem]),
            _ => continue,
        };
        keys.push(key);
    }
    keys
}

pub fn filter_index_keys(filter: &Filter) -> BTreeSet<String> {
    filter.rules.iter().flat_map(rule_keys).collect()
}

/// Keys an object is expected under: the union over its filters, or the
/// catch-all key when none of them is indexable.
pub fn object_index_keys<'f>(filters: impl IntoIterator<Item = &'f Filter>) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = filters.into_iter().flat_map(filter_index_keys).collect();
    if keys.is_empty() {
        keys.insert(CATCH_ALL_KEY.to_string());
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_element() {
        let rule = FilterRule::new("*string", "~*req.Account", &["1001", "1002"]);
        assert_eq!(
            rule_keys(&rule).to_vec(),
            vec!["*string:*req.Account:1001", "*string:*req.Account:1002"]
        );
    }

    #[test]
    fn test_dynamic_value_is_swapped() {
        let rule = FilterRule::new("*prefix", "10", &["~*req.Account"]);
        assert_eq!(rule_keys(&rule).to_vec(), vec!["*prefix:*req.Account:10"]);
    }

    #[test]
    fn test_both_or_neither_dynamic_skipped() {
        let both = FilterRule::new("*string", "~*req.Account", &["~*req.Subject"]);
        let neither = FilterRule::new("*string", "*req.Account", &["1001"]);
        assert!(rule_keys(&both).is_empty());
        assert!(rule_keys(&neither).is_empty());

        let mixed = FilterRule::new("*string", "~*req.Account", &["~*req.Subject", "1001"]);
        assert_eq!(rule_keys(&mixed).to_vec(), vec!["*string:*req.Account:1001"]);
    }

    #[test]
    fn test_non_indexable_types_and_paths() {
        assert!(rule_keys(&FilterRule::new("*gt", "~*req.Usage", &["10"])).is_empty());
        assert!(rule_keys(&FilterRule::new("*notstring", "~*req.Account", &["1001"])).is_empty());
        assert!(rule_keys(&FilterRule::new("*string", "~*stats.STS_1.*acd", &["10"])).is_empty());
        assert!(rule_keys(&FilterRule::new("*string", "1001", &["~*accounts.1001.ID"])).is_empty());
    }

    #[test]
    fn test_object_keys_catch_all() {
        let gt = Filter::new("cgrates.org", "FLTR_GT", vec![FilterRule::new("*gt", "~*req.Usage", &["10"])]);
        assert_eq!(object_index_keys([&gt]), BTreeSet::from([CATCH_ALL_KEY.to_string()]));
        assert_eq!(object_index_keys(std::iter::empty()), BTreeSet::from([CATCH_ALL_KEY.to_string()]));

        let acc = Filter::new(
            "cgrates.org",
            "FLTR_ACC",
            vec![FilterRule::new("*string", "~*req.Account", &["1001"])],
        );
        assert_eq!(
            object_index_keys([&gt, &acc]),
            BTreeSet::from(["*string:*req.Account:1001".to_string()])
        );
    }
}
