use crate::error::{Error, Result};
use crate::keys::{self, DYNAMIC_DATA_PREFIX, INLINE_VALUE_SEP, META, META_ANY};
use crate::kind::ProfileKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Set of object IDs (or `objectID:context` members in reverse indexes).
pub type StringSet = HashSet<String, ahash::RandomState>;

/// Index key → bucket, as read from or written to one partition.
/// An empty bucket written with `merge = true` deletes the key.
pub type IndexMap = BTreeMap<String, StringSet>;

pub fn string_set<I, S>(items: I) -> StringSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

// ============ RULES ============

/// Predicate type of a filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleType {
    String,
    Prefix,
    Suffix,
    Contains,
    Exists,
    Empty,
    Gt,
    Gte,
    Lt,
    Lte,
    Regex,
    Rsr,
    Destinations,
    Timings,
    Ipnet,
    ActivationInterval,
    Never,
    /// `*not<type>` negation of another predicate.
    Not(Box<RuleType>),
    Other(String),
}

impl RuleType {
    pub fn parse(s: &str) -> Self {
        match s {
            "*string" => RuleType::String,
            "*prefix" => RuleType::Prefix,
            "*suffix" => RuleType::Suffix,
            "*contains" => RuleType::Contains,
            "*exists" => RuleType::Exists,
            "*empty" => RuleType::Empty,
            "*gt" => RuleType::Gt,
            "*gte" => RuleType::Gte,
            "*lt" => RuleType::Lt,
            "*lte" => RuleType::Lte,
            "*regex" => RuleType::Regex,
            "*rsr" => RuleType::Rsr,
            "*destinations" => RuleType::Destinations,
            "*timings" => RuleType::Timings,
            "*ipnet" => RuleType::Ipnet,
            "*ai" => RuleType::ActivationInterval,
            "*never" => RuleType::Never,
            other => match other.strip_prefix("*not") {
                Some(rest) if !rest.is_empty() => {
                    RuleType::Not(Box::new(RuleType::parse(&format!("{META}{rest}"))))
                }
                _ => RuleType::Other(other.to_string()),
            },
        }
    }

    pub fn as_str(&self) -> std::borrow::Cow<'static, str> {
        use std::borrow::Cow;
        match self {
            RuleType::String => Cow::Borrowed("*string"),
            RuleType::Prefix => Cow::Borrowed("*prefix"),
            RuleType::Suffix => Cow::Borrowed("*suffix"),
            RuleType::Contains => Cow::Borrowed("*contains"),
            RuleType::Exists => Cow::Borrowed("*exists"),
            RuleType::Empty => Cow::Borrowed("*empty"),
            RuleType::Gt => Cow::Borrowed("*gt"),
            RuleType::Gte => Cow::Borrowed("*gte"),
            RuleType::Lt => Cow::Borrowed("*lt"),
            RuleType::Lte => Cow::Borrowed("*lte"),
            RuleType::Regex => Cow::Borrowed("*regex"),
            RuleType::Rsr => Cow::Borrowed("*rsr"),
            RuleType::Destinations => Cow::Borrowed("*destinations"),
            RuleType::Timings => Cow::Borrowed("*timings"),
            RuleType::Ipnet => Cow::Borrowed("*ipnet"),
            RuleType::ActivationInterval => Cow::Borrowed("*ai"),
            RuleType::Never => Cow::Borrowed("*never"),
            RuleType::Not(inner) => {
                let inner = inner.as_str();
                Cow::Owned(format!("*not{}", inner.trim_start_matches('*')))
            }
            RuleType::Other(s) => Cow::Owned(s.clone()),
        }
    }

    /// Only equality, prefix and suffix predicates land in the index.
    pub fn is_indexable(&self) -> bool {
        matches!(self, RuleType::String | RuleType::Prefix | RuleType::Suffix)
    }

    /// Types evaluated on the element alone.
    pub fn takes_values(&self) -> bool {
        match self {
            RuleType::Exists | RuleType::Empty | RuleType::Never => false,
            RuleType::Not(inner) => inner.takes_values(),
            _ => true,
        }
    }
}

impl From<String> for RuleType {
    fn from(s: String) -> Self {
        RuleType::parse(&s)
    }
}

impl From<RuleType> for String {
    fn from(t: RuleType) -> Self {
        t.as_str().into_owned()
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// A rule element or value after the dynamic-reference marker was inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand<'a> {
    /// Literal text.
    Static(&'a str),
    /// Path into the event, marker stripped (`~*req.Account` → `*req.Account`).
    Dynamic(&'a str),
    /// Path into another subsystem (`~*stats...`); never indexable.
    External(&'a str),
}

impl<'a> Operand<'a> {
    pub fn parse(raw: &'a str) -> Self {
        if keys::is_unindexable_path(raw) {
            return Operand::External(raw);
        }
        match raw.strip_prefix(DYNAMIC_DATA_PREFIX) {
            Some(path) => Operand::Dynamic(path),
            None => Operand::Static(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    #[serde(rename = "Type")]
    pub rule_type: RuleType,
    #[serde(rename = "Element")]
    pub element: String,
    #[serde(rename = "Values", default)]
    pub values: Vec<String>,
}

impl FilterRule {
    pub fn new(rule_type: &str, element: &str, values: &[&str]) -> Self {
        Self {
            rule_type: RuleType::parse(rule_type),
            element: element.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn element_operand(&self) -> Operand<'_> {
        Operand::parse(&self.element)
    }

    pub fn value_operands(&self) -> impl Iterator<Item = Operand<'_>> {
        self.values.iter().map(|v| Operand::parse(v))
    }
}

// ============ FILTERS ============

/// Time window (unix seconds) in which a filter is active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationInterval {
    #[serde(rename = "ActivationTime", default)]
    pub activation_time: Option<u64>,
    #[serde(rename = "ExpiryTime", default)]
    pub expiry_time: Option<u64>,
}

impl ActivationInterval {
    pub fn is_active_at(&self, ts: u64) -> bool {
        self.activation_time.map_or(true, |a| ts >= a) && self.expiry_time.map_or(true, |e| ts < e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "Tenant")]
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Rules", default)]
    pub rules: Vec<FilterRule>,
    #[serde(rename = "ActivationInterval", default, skip_serializing_if = "Option::is_none")]
    pub activation_interval: Option<ActivationInterval>,
}

impl Filter {
    pub fn new(tenant: &str, id: &str, rules: Vec<FilterRule>) -> Self {
        Self {
            tenant: tenant.to_string(),
            id: id.to_string(),
            rules,
            activation_interval: None,
        }
    }

    pub fn tenant_id(&self) -> String {
        keys::concatenated_key(&[&self.tenant, &self.id])
    }

    /// Inline filters are written directly in a profile's filter list.
    pub fn is_inline_id(id: &str) -> bool {
        id.starts_with(META)
    }

    /// Parses `*type:element:v1|v2` into a single-rule filter whose ID is the rule itself.
    pub fn from_inline(tenant: &str, inline: &str) -> Result<Self> {
        let mut parts = inline.splitn(3, keys::CONCATENATED_KEY_SEP);
        let (Some(rule_type), Some(element), Some(values)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::InlineParse(inline.to_string()));
        };
        if rule_type.is_empty() || element.is_empty() {
            return Err(Error::InlineParse(inline.to_string()));
        }
        let values: Vec<String> = if values.is_empty() {
            Vec::new()
        } else {
            values.split(INLINE_VALUE_SEP).map(str::to_string).collect()
        };
        let filter = Self {
            tenant: tenant.to_string(),
            id: inline.to_string(),
            rules: vec![FilterRule {
                rule_type: RuleType::parse(rule_type),
                element: element.to_string(),
                values,
            }],
            activation_interval: None,
        };
        filter.check_rules().map_err(|_| Error::InlineParse(inline.to_string()))?;
        Ok(filter)
    }

    /// Checks a filter about to be stored. IDs starting with `*` are reserved
    /// for inline filters and would never be reverse-indexed.
    pub fn validate(&self) -> Result<()> {
        if self.tenant.is_empty() || self.id.is_empty() {
            return Err(Error::InvalidFilter("missing tenant or ID".to_string()));
        }
        if Self::is_inline_id(&self.id) {
            return Err(Error::InvalidFilter(format!(
                "filter ID <{}> is reserved for inline filters",
                self.id
            )));
        }
        self.check_rules()
    }

    fn check_rules(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(Error::InvalidFilter(format!("filter <{}> has no rules", self.tenant_id())));
        }
        for rule in &self.rules {
            if rule.element.is_empty() {
                return Err(Error::InvalidFilter(format!(
                    "rule {} of <{}> has no element",
                    rule.rule_type,
                    self.tenant_id()
                )));
            }
            if rule.rule_type.takes_values() && rule.values.is_empty() {
                return Err(Error::InvalidFilter(format!(
                    "rule {} on {} of <{}> has no values",
                    rule.rule_type,
                    rule.element,
                    self.tenant_id()
                )));
            }
        }
        Ok(())
    }
}

// ============ INDEXED OBJECTS ============

/// The shape every indexed profile shares: its filters and, for
/// context-scoped kinds, the contexts it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "Kind")]
    pub kind: ProfileKind,
    #[serde(rename = "Tenant")]
    pub tenant: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "FilterIDs", default)]
    pub filter_ids: Vec<String>,
    #[serde(rename = "Contexts", default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,
}

impl ProfileRecord {
    pub fn new(kind: ProfileKind, tenant: &str, id: &str, filter_ids: &[&str]) -> Self {
        Self {
            kind,
            tenant: tenant.to_string(),
            id: id.to_string(),
            filter_ids: filter_ids.iter().map(|f| f.to_string()).collect(),
            contexts: None,
        }
    }

    pub fn with_contexts(mut self, contexts: &[&str]) -> Self {
        self.contexts = Some(contexts.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn tenant_id(&self) -> String {
        keys::concatenated_key(&[&self.tenant, &self.id])
    }

    /// Contexts the object is indexed under: `[""]` for kinds without
    /// contexts, `[*any]` for context-scoped objects that declare none.
    pub fn index_contexts(&self) -> Vec<String> {
        if !self.kind.has_context() {
            return vec![String::new()];
        }
        match &self.contexts {
            Some(ctxs) if !ctxs.is_empty() => {
                let uniq: BTreeSet<&String> = ctxs.iter().collect();
                uniq.into_iter().cloned().collect()
            }
            _ => vec![META_ANY.to_string()],
        }
    }
}

/// Scheduled action plan and the accounts it runs for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "AccountIDs", default)]
    pub account_ids: BTreeSet<String>,
}

impl ActionPlan {
    pub fn new(id: &str, accounts: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            account_ids: accounts.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Named set of dialing prefixes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Prefixes", default)]
    pub prefixes: Vec<String>,
}

impl Destination {
    pub fn new(id: &str, prefixes: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_type_round_trip_names() {
        for name in ["*string", "*prefix", "*suffix", "*gt", "*ai", "*notstring", "*custom"] {
            assert_eq!(RuleType::parse(name).as_str(), name);
        }
        assert_eq!(
            RuleType::parse("*notprefix"),
            RuleType::Not(Box::new(RuleType::Prefix))
        );
        assert!(!RuleType::parse("*notstring").is_indexable());
        assert!(RuleType::parse("*suffix").is_indexable());
    }

    #[test]
    fn test_operand_parse() {
        assert_eq!(Operand::parse("~*req.Account"), Operand::Dynamic("*req.Account"));
        assert_eq!(Operand::parse("1001"), Operand::Static("1001"));
        assert_eq!(
            Operand::parse("~*stats.Stat1.*acd"),
            Operand::External("~*stats.Stat1.*acd")
        );
    }

    #[test]
    fn test_inline_filter() {
        let f = Filter::from_inline("cgrates.org", "*string:~*req.Account:1001|1002").unwrap();
        assert_eq!(f.id, "*string:~*req.Account:1001|1002");
        assert_eq!(f.rules.len(), 1);
        assert_eq!(f.rules[0].rule_type, RuleType::String);
        assert_eq!(f.rules[0].element, "~*req.Account");
        assert_eq!(f.rules[0].values, vec!["1001", "1002"]);

        assert!(Filter::from_inline("cgrates.org", "*string:~*req.Account").is_err());
        assert!(Filter::from_inline("cgrates.org", "*string:~*req.Account:").is_err());
        assert!(Filter::from_inline("cgrates.org", "*exists:~*req.Account:").is_ok());
    }

    #[test]
    fn test_filter_json_shape() {
        let raw = r#"{"Tenant":"cgrates.org","ID":"FLTR_1","Rules":[{"Type":"*prefix","Element":"~*req.Destination","Values":["+49"]}]}"#;
        let f: Filter = serde_json::from_str(raw).unwrap();
        assert_eq!(f.rules[0].rule_type, RuleType::Prefix);
        assert!(f.validate().is_ok());
        let back = serde_json::to_value(&f).unwrap();
        assert_eq!(back["Rules"][0]["Type"], "*prefix");
    }

    #[test]
    fn test_stored_id_cannot_look_inline() {
        let rules = vec![FilterRule::new("*string", "~*req.Account", &["1001"])];
        let err = Filter::new("cgrates.org", "*string:~*req.Account:1001", rules.clone())
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(ref msg) if msg.contains("reserved")));
        assert!(Filter::new("cgrates.org", "FLTR_1", rules).validate().is_ok());
        // inline parsing still accepts its own IDs
        assert!(Filter::from_inline("cgrates.org", "*string:~*req.Account:1001").is_ok());
    }

    #[test]
    fn test_activation_interval() {
        let ai = ActivationInterval {
            activation_time: Some(100),
            expiry_time: Some(200),
        };
        assert!(!ai.is_active_at(99));
        assert!(ai.is_active_at(100));
        assert!(!ai.is_active_at(200));
        assert!(ActivationInterval::default().is_active_at(0));
    }

    #[test]
    fn test_index_contexts() {
        let th = ProfileRecord::new(ProfileKind::Threshold, "cgrates.org", "TH1", &[]);
        assert_eq!(th.index_contexts(), vec![String::new()]);

        let attr = ProfileRecord::new(ProfileKind::Attribute, "cgrates.org", "ATTR_1", &[]);
        assert_eq!(attr.index_contexts(), vec!["*any".to_string()]);

        let attr = attr.with_contexts(&["*sessions", "*cdrs", "*sessions"]);
        assert_eq!(attr.index_contexts(), vec!["*cdrs".to_string(), "*sessions".to_string()]);
    }
}
