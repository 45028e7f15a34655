use rpds::HashTrieMap;
use tracing::debug;

use crate::{parser::parse_rules, prelude::*, term::TermRef};

pub const DEFAULT_RULES: &str = "\
S x y z = x z (y z)
K x y = x
I x = x
B x y z = x (y z)
C x y z = x z y
W x y = x y y";

/// A named rewrite rule: `name parameters = body`.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Rule {
    pub name: Identifier,
    pub parameters: Vec<Identifier>,
    pub body: TermRef,
}
impl Rule {
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        for parameter in &self.parameters {
            f.write_fmt(format_args!(" {parameter}"))?;
        }
        f.write_fmt(format_args!(" = {}", self.body))
    }
}

/// Rules keyed by name. Reduction only ever reads from it; inserting produces a
/// new version and leaves clones of the old one untouched.
#[derive(Default, Clone, Debug)]
pub struct RuleSet {
    rules: HashTrieMap<Identifier, Rule>,
}
impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `S`, `K`, `I`, `B`, `C` and `W`.
    pub fn standard() -> Self {
        parse_rules(DEFAULT_RULES).expect("Something went wrong: the default rules must parse")
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Adds `rule`, replacing any rule with the same name.
    pub fn insert(&mut self, rule: Rule) {
        if self.rules.contains_key(&rule.name) {
            debug!(name = %rule.name, "replacing an earlier definition");
        }
        self.rules = self.rules.insert(rule.name.clone(), rule);
    }

    pub fn len(&self) -> usize {
        self.rules.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        let mut rules = self.rules.iter().map(|(_, rule)| rule).collect::<Vec<_>>();
        rules.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));
        rules.into_iter()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<T: IntoIterator<Item = Rule>>(iter: T) -> Self {
        let mut ret = RuleSet::new();
        for rule in iter {
            ret.insert(rule);
        }
        debug!(count = ret.len(), "built rule set");
        ret
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser::parse_definition;

    #[test]
    fn test_standard_rules() {
        let rules = RuleSet::standard();
        assert_eq!(rules.len(), 6);
        assert_eq!(
            rules.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
            vec![
                "B x y z = x (y z)",
                "C x y z = x z y",
                "I x = x",
                "K x y = x",
                "S x y z = x z (y z)",
                "W x y = x y y",
            ]
        );
        assert_eq!(rules.get("W").unwrap().arity(), 2);
        assert!(rules.get("X").is_none());
    }

    #[test]
    fn test_insert_keeps_earlier_versions() {
        let before = RuleSet::standard();
        let mut after = before.clone();
        after.insert(parse_definition("K x y = y").unwrap());
        after.insert(parse_definition("T = K").unwrap());
        assert_eq!(after.len(), 7);
        assert_eq!(after.get("K").unwrap().to_string(), "K x y = y");
        assert_eq!(after.get("T").unwrap().to_string(), "T = K");
        assert_eq!(before.len(), 6);
        assert_eq!(before.get("K").unwrap().to_string(), "K x y = x");
    }

    #[test]
    fn test_empty() {
        let rules = RuleSet::new();
        assert!(rules.is_empty());
        assert_eq!(rules.iter().count(), 0);
    }
}
