//! Parsed rule representation.
//!
//! Trees are immutable once built and carry no per-request state, so a compiled rule set can
//! be shared between any number of concurrent evaluations.

use regex::Regex;
use std::fmt;
use std::net::IpAddr;

use crate::net::CidrBlock;

/// Caller assigned rule identifier.
pub type RuleId = u32;

/// A regex literal compiled for full-string matching.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile `source` anchored at both ends, so a match must cover the whole value.
    ///
    /// `source` has to be a valid regex by itself; text such as `a)|(b` only becomes valid
    /// once wrapped and would slip out of the anchors.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source)?;
        let regex = Regex::new(&format!(r"\A(?:{source})\z"))?;
        Ok(Self { source: source.to_string(), regex })
    }

    pub fn is_full_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// The pattern as written in the rule.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

/// Predicate tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `IP = <address>`
    IpEquals(IpAddr),
    /// `IP ~ <cidr>`
    IpMatches(CidrBlock),
    /// `IP in <list>`
    IpInList(String),
    /// `Host = "<name>"`
    HostEquals(String),
    /// `Host ~ /<regex>/`
    HostMatches(Pattern),
    /// `<Header> = "<value>"`
    HeaderEquals { name: String, value: String },
    /// `<Header> ~ /<regex>/`
    HeaderMatches { name: String, pattern: Pattern },
    /// `Hits > <n>`
    HitsGreaterThan(u64),
    Negation(Box<Predicate>),
    /// Two or more children, evaluated left to right
    Conjunction(Vec<Predicate>),
    /// Two or more children, evaluated left to right
    Disjunction(Vec<Predicate>),
}

impl Predicate {
    /// Names of all access lists referenced anywhere in the tree, in source order.
    pub fn access_lists(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_lists(&mut names);
        names
    }

    fn collect_lists<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Predicate::IpInList(name) => names.push(name),
            Predicate::Negation(child) => child.collect_lists(names),
            Predicate::Conjunction(children) | Predicate::Disjunction(children) => {
                children.iter().for_each(|c| c.collect_lists(names))
            }
            _ => {}
        }
    }

    /// Binding strength used when printing, higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            Predicate::Disjunction(_) => 0,
            Predicate::Conjunction(_) => 1,
            _ => 2,
        }
    }

    fn fmt_child(&self, child: &Predicate, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() <= self.precedence() && child.precedence() < 2 {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

/// Renders the tree back in rule syntax.
impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::IpEquals(addr) => write!(f, "IP = {addr}"),
            Predicate::IpMatches(block) => write!(f, "IP ~ {block}"),
            Predicate::IpInList(name) => write!(f, "IP in {name}"),
            Predicate::HostEquals(host) => write!(f, "Host = {}", Quoted(host)),
            Predicate::HostMatches(pattern) => write!(f, "Host ~ /{}/", escape_slashes(pattern)),
            Predicate::HeaderEquals { name, value } => write!(f, "{name} = {}", Quoted(value)),
            Predicate::HeaderMatches { name, pattern } => {
                write!(f, "{name} ~ /{}/", escape_slashes(pattern))
            }
            Predicate::HitsGreaterThan(n) => write!(f, "Hits > {n}"),
            Predicate::Negation(child) => {
                f.write_str("!")?;
                if child.precedence() < 2 {
                    write!(f, "({child})")
                } else {
                    write!(f, "{child}")
                }
            }
            Predicate::Conjunction(children) | Predicate::Disjunction(children) => {
                let op = if matches!(self, Predicate::Conjunction(_)) { " && " } else { " || " };
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(op)?;
                    }
                    self.fmt_child(child, f)?;
                }
                Ok(())
            }
        }
    }
}

/// A string literal in rule syntax. Only `"` and `\` are escaped, everything else is
/// written as is.
struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for c in self.0.chars() {
            if matches!(c, '"' | '\\') {
                f.write_str("\\")?;
            }
            write!(f, "{c}")?;
        }
        f.write_str("\"")
    }
}

fn escape_slashes(pattern: &Pattern) -> String {
    pattern.as_str().replace('/', "\\/")
}

/// A compiled rule: predicate tree plus the action label returned when it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    id: RuleId,
    predicate: Predicate,
    action: String,
}

impl Rule {
    pub fn new(id: RuleId, predicate: Predicate, action: impl Into<String>) -> Self {
        Self { id, predicate, action: action.into() }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.predicate, self.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_pattern_full_match() -> Result<(), regex::Error> {
        let p = Pattern::new("some.*")?;
        assert!(p.is_full_match("somehost"));
        assert!(!p.is_full_match("othersomehost"));

        let p = Pattern::new(r".*\.adsl\.tpnet\.pl")?;
        assert!(p.is_full_match("a7b1.adsl.tpnet.pl"));
        assert!(!p.is_full_match("a7b1.adsl.tpnet.pl.example.com"));
        Ok(())
    }

    #[test]
    fn test_pattern_alternation_is_anchored_as_a_whole() -> Result<(), regex::Error> {
        let p = Pattern::new("a|b")?;
        assert!(p.is_full_match("a"));
        assert!(!p.is_full_match("ab"));
        Ok(())
    }

    #[test]
    fn test_pattern_must_be_valid_on_its_own() {
        assert!(Pattern::new("a)|(b").is_err());
        assert!(Pattern::new("(a)|(b)").is_ok());
    }

    #[test]
    fn test_quoted_escapes_only_quote_and_backslash() {
        assert_eq!(Quoted("a\tb").to_string(), "\"a\tb\"");
        assert_eq!(Quoted(r#"say "hi" \ bye"#).to_string(), r#""say \"hi\" \\ bye""#);
    }

    #[test]
    fn test_display_round_trips_precedence() -> Result<(), regex::Error> {
        let tree = Predicate::Conjunction(vec![
            Predicate::Disjunction(vec![
                Predicate::HeaderMatches {
                    name: "User-Agent".to_string(),
                    pattern: Pattern::new(".*MSIE.*")?,
                },
                Predicate::HostEquals("example.com".to_string()),
            ]),
            Predicate::Negation(Box::new(Predicate::IpEquals(IpAddr::V4(Ipv4Addr::new(
                10, 0, 0, 1,
            ))))),
            Predicate::HitsGreaterThan(5),
        ]);
        assert_eq!(
            tree.to_string(),
            r#"(User-Agent ~ /.*MSIE.*/ || Host = "example.com") && !IP = 10.0.0.1 && Hits > 5"#
        );
        Ok(())
    }

    #[test]
    fn test_access_lists_collected_in_order() {
        let tree = Predicate::Disjunction(vec![
            Predicate::IpInList("office".to_string()),
            Predicate::Negation(Box::new(Predicate::IpInList("vpn".to_string()))),
        ]);
        assert_eq!(tree.access_lists(), vec!["office", "vpn"]);
    }
}
