//! Recursive descent parser for rule text.
//!
//! ```text
//! rule        := disjunction "=>" action
//! disjunction := conjunction ( "||" conjunction )*
//! conjunction := negation ( "&&" negation )*
//! negation    := "!" negation | predicate | "(" disjunction ")"
//! predicate   := "IP" ( "=" ipaddr | "~" cidr | "in" list )
//!              | "Host" ( "=" string | "~" regex )
//!              | "Hits" ">" integer
//!              | header ( "=" string | "~" regex )
//! action      := word
//! ```
//!
//! Keywords are case-sensitive. Children of `&&`/`||` keep their source order, which is
//! the order the evaluator short-circuits in.

use std::str::FromStr;

use super::ast::{Pattern, Predicate, Rule, RuleId};
use super::error::{ParseError, ParseErrorKind, Position};
use super::lexer::{tokenize_into, Token, TokenKind};
use crate::net::{parse_address, CidrBlock};

const KEYWORD_IP: &str = "IP";
const KEYWORD_HOST: &str = "Host";
const KEYWORD_HITS: &str = "Hits";
const KEYWORD_IN: &str = "in";

/// Deepest accepted chain of `!` and `(` groups.
pub const MAX_NESTING_DEPTH: usize = 64;

static EOF: TokenKind = TokenKind::Eof;

/// A reusable rule parser.
///
/// Holds its token buffer between calls, so one instance can parse many rules without
/// reallocating. Not thread safe; share instances through
/// [`ParserPool`](super::pool::ParserPool).
#[derive(Debug, Default)]
pub struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
    depth: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `text` into a rule with the given id.
    ///
    /// Either the whole text is consumed and a complete rule is returned, or an error
    /// pointing at the offending token is.
    pub fn parse(&mut self, id: RuleId, text: &str) -> Result<Rule, ParseError> {
        self.reset(text)?;
        let predicate = self.disjunction()?;
        self.expect(TokenKind::Arrow, "'=>'")?;
        let action = self.word("action")?;
        self.expect(TokenKind::Eof, "end of rule")?;
        Ok(Rule::new(id, predicate, action))
    }

    fn reset(&mut self, text: &str) -> Result<(), ParseError> {
        self.cursor = 0;
        self.depth = 0;
        let result = tokenize_into(text, &mut self.tokens);
        if result.is_err() {
            self.tokens.clear();
        }
        result
    }

    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.cursor)
            .map(|t| &t.kind)
            .unwrap_or(&EOF)
    }

    fn position(&self) -> Position {
        self.tokens
            .get(self.cursor)
            .or_else(|| self.tokens.last())
            .map(|t| t.position)
            .unwrap_or_default()
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens.get(self.cursor).cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            position: self.position(),
        });
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        token
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::new(
            ParseErrorKind::Unexpected { found: self.peek().to_string(), expected },
            self.position(),
        )
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<(), ParseError> {
        if *self.peek() == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn word(&mut self, expected: &'static str) -> Result<String, ParseError> {
        match self.peek() {
            TokenKind::Word(_) => match self.advance().kind {
                TokenKind::Word(w) => Ok(w),
                _ => Err(self.unexpected(expected)),
            },
            _ => Err(self.unexpected(expected)),
        }
    }

    fn disjunction(&mut self) -> Result<Predicate, ParseError> {
        let mut children = vec![self.conjunction()?];
        while *self.peek() == TokenKind::Or {
            self.advance();
            children.push(self.conjunction()?);
        }
        Ok(collapse(children, Predicate::Disjunction))
    }

    fn conjunction(&mut self) -> Result<Predicate, ParseError> {
        let mut children = vec![self.negation()?];
        while *self.peek() == TokenKind::And {
            self.advance();
            children.push(self.negation()?);
        }
        Ok(collapse(children, Predicate::Conjunction))
    }

    fn negation(&mut self) -> Result<Predicate, ParseError> {
        match self.peek() {
            TokenKind::Not => {
                self.enter()?;
                self.advance();
                let child = self.negation()?;
                self.depth -= 1;
                Ok(Predicate::Negation(Box::new(child)))
            }
            TokenKind::LParen => {
                self.enter()?;
                self.advance();
                let inner = self.disjunction()?;
                self.expect(TokenKind::RParen, "')'")?;
                self.depth -= 1;
                Ok(inner)
            }
            _ => self.predicate(),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        if self.depth == MAX_NESTING_DEPTH {
            return Err(ParseError::new(
                ParseErrorKind::TooDeep(MAX_NESTING_DEPTH),
                self.position(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn predicate(&mut self) -> Result<Predicate, ParseError> {
        let subject = self.word("predicate")?;
        match subject.as_str() {
            KEYWORD_IP => self.ip_predicate(),
            KEYWORD_HOST => match self.peek() {
                TokenKind::Eq => {
                    self.advance();
                    Ok(Predicate::HostEquals(self.string()?))
                }
                TokenKind::Tilde => {
                    self.advance();
                    Ok(Predicate::HostMatches(self.regex()?))
                }
                _ => Err(self.unexpected("'=' or '~'")),
            },
            KEYWORD_HITS => {
                self.expect(TokenKind::Gt, "'>'")?;
                let position = self.position();
                let text = self.word("hit count")?;
                let threshold = text
                    .parse::<u64>()
                    .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber(text), position))?;
                Ok(Predicate::HitsGreaterThan(threshold))
            }
            _ => match self.peek() {
                TokenKind::Eq => {
                    self.advance();
                    Ok(Predicate::HeaderEquals { name: subject, value: self.string()? })
                }
                TokenKind::Tilde => {
                    self.advance();
                    Ok(Predicate::HeaderMatches { name: subject, pattern: self.regex()? })
                }
                _ => Err(self.unexpected("'=' or '~'")),
            },
        }
    }

    fn ip_predicate(&mut self) -> Result<Predicate, ParseError> {
        match self.peek().clone() {
            TokenKind::Eq => {
                self.advance();
                let position = self.position();
                let text = self.word("IP address")?;
                parse_address(&text)
                    .map(Predicate::IpEquals)
                    .ok_or_else(|| ParseError::new(ParseErrorKind::InvalidAddress(text), position))
            }
            TokenKind::Tilde => {
                self.advance();
                let position = self.position();
                let text = self.word("CIDR block")?;
                CidrBlock::from_str(&text)
                    .map(Predicate::IpMatches)
                    .map_err(|e| ParseError::new(e.into(), position))
            }
            TokenKind::Word(w) if w == KEYWORD_IN => {
                self.advance();
                Ok(Predicate::IpInList(self.word("access list name")?))
            }
            _ => Err(self.unexpected("'=', '~' or 'in'")),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            TokenKind::Str(_) => match self.advance().kind {
                TokenKind::Str(s) => Ok(s),
                _ => Err(self.unexpected("quoted string")),
            },
            _ => Err(self.unexpected("quoted string")),
        }
    }

    fn regex(&mut self) -> Result<Pattern, ParseError> {
        let position = self.position();
        match self.peek() {
            TokenKind::Regex(_) => match self.advance().kind {
                TokenKind::Regex(source) => Pattern::new(&source).map_err(|e| {
                    ParseError::new(
                        ParseErrorKind::InvalidRegex { pattern: source, reason: e.to_string() },
                        position,
                    )
                }),
                _ => Err(self.unexpected("/regex/")),
            },
            _ => Err(self.unexpected("/regex/")),
        }
    }
}

/// A single child stands for itself; composites always have two or more children.
fn collapse(mut children: Vec<Predicate>, compose: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if children.len() == 1 {
        children.remove(0)
    } else {
        compose(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn parse(text: &str) -> Result<Rule, ParseError> {
        Parser::new().parse(1, text)
    }

    #[test]
    fn test_ip_equals() -> Result<(), ParseError> {
        let rule = parse("IP = 192.168.0.1 => reject")?;
        assert_eq!(rule.id(), 1);
        assert_eq!(rule.action(), "reject");
        assert_eq!(
            rule.predicate(),
            &Predicate::IpEquals(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1)))
        );
        Ok(())
    }

    #[test]
    fn test_ip_matches_and_list() -> Result<(), Box<dyn std::error::Error>> {
        let rule = parse("IP ~ 192.168.0.0/24 || IP in office => reject")?;
        assert_eq!(
            rule.predicate(),
            &Predicate::Disjunction(vec![
                Predicate::IpMatches("192.168.0.0/24".parse()?),
                Predicate::IpInList("office".to_string()),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_precedence_and_source_order() -> Result<(), ParseError> {
        let rule = parse("Hits > 1 || Host = \"a\" && !Referer ~ /x/ => reject")?;
        let Predicate::Disjunction(children) = rule.predicate() else {
            panic!("expected disjunction, got {:?}", rule.predicate());
        };
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], Predicate::HitsGreaterThan(1));
        let Predicate::Conjunction(inner) = &children[1] else {
            panic!("expected conjunction, got {:?}", children[1]);
        };
        assert_eq!(inner[0], Predicate::HostEquals("a".to_string()));
        assert!(matches!(inner[1], Predicate::Negation(_)));
        Ok(())
    }

    #[test]
    fn test_parentheses_group() -> Result<(), ParseError> {
        let rule = parse(
            r"(User-Agent ~ /.*Internet Explorer.*/ || Host ~ /.*\.adsl\.tpnet\.pl/ ) && Hits > 2 => reject",
        )?;
        let Predicate::Conjunction(children) = rule.predicate() else {
            panic!("expected conjunction, got {:?}", rule.predicate());
        };
        assert!(matches!(children[0], Predicate::Disjunction(_)));
        assert_eq!(children[1], Predicate::HitsGreaterThan(2));
        Ok(())
    }

    #[test]
    fn test_display_reparses_to_same_tree() -> Result<(), ParseError> {
        let text = r#"(Host ~ /.*\.example\.com/ || X-Forwarded-For = "1.2.3.4") && !(IP ~ 10.0.0.0/8 && Hits > 3) => throttle"#;
        let rule = parse(text)?;
        let again = parse(&rule.to_string())?;
        assert_eq!(rule, again);
        Ok(())
    }

    #[test]
    fn test_string_with_control_characters_reparses() -> Result<(), ParseError> {
        let rule = parse("Host = \"a\tb\" || X-Note = \"line\nbreak \\\\ \\\"q\\\"\" => reject")?;
        let again = parse(&rule.to_string())?;
        assert_eq!(rule, again);
        let Predicate::Disjunction(children) = again.predicate() else {
            panic!("expected disjunction, got {:?}", again.predicate());
        };
        assert_eq!(children[0], Predicate::HostEquals("a\tb".to_string()));
        assert_eq!(
            children[1],
            Predicate::HeaderEquals {
                name: "X-Note".to_string(),
                value: "line\nbreak \\ \"q\"".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn test_regex_escaping_its_anchors_is_rejected() {
        assert!(matches!(
            parse("Host ~ /a)|(b/ => x"),
            Err(ParseError { kind: ParseErrorKind::InvalidRegex { .. }, .. })
        ));
    }

    #[test]
    fn test_nesting_depth_is_capped() -> Result<(), ParseError> {
        let deepest = format!("{}Hits > 1 => x", "!".repeat(MAX_NESTING_DEPTH));
        parse(&deepest)?;

        let too_deep = format!("{}Hits > 1 => x", "!".repeat(MAX_NESTING_DEPTH + 1));
        assert!(matches!(
            parse(&too_deep),
            Err(ParseError { kind: ParseErrorKind::TooDeep(MAX_NESTING_DEPTH), .. })
        ));

        let parens = format!(
            "{}Hits > 1{} => x",
            "(".repeat(10 * MAX_NESTING_DEPTH),
            ")".repeat(10 * MAX_NESTING_DEPTH)
        );
        assert!(matches!(
            parse(&parens),
            Err(ParseError { kind: ParseErrorKind::TooDeep(_), .. })
        ));

        let chain = format!("{}Hits > 1 => x", "!(".repeat(MAX_NESTING_DEPTH));
        assert!(matches!(parse(&chain), Err(ParseError { kind: ParseErrorKind::TooDeep(_), .. })));
        Ok(())
    }

    #[test]
    fn test_missing_action_clause() {
        let err = parse("IP = 192.168.0.1");
        assert!(matches!(
            err,
            Err(ParseError { kind: ParseErrorKind::Unexpected { expected: "'=>'", .. }, .. })
        ));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse("IP = 192.168.0.1 => reject now");
        let Err(err) = err else {
            panic!("trailing tokens must be rejected");
        };
        assert_eq!(err.position.column, 28);
    }

    #[test]
    fn test_invalid_literals() {
        assert!(matches!(
            parse("IP = 192.168.0.333 => reject"),
            Err(ParseError { kind: ParseErrorKind::InvalidAddress(_), .. })
        ));
        assert!(matches!(
            parse("IP ~ 192.168.0.0/40 => reject"),
            Err(ParseError { kind: ParseErrorKind::InvalidCidr(_), .. })
        ));
        assert!(matches!(
            parse("Host ~ /(unclosed/ => reject"),
            Err(ParseError { kind: ParseErrorKind::InvalidRegex { .. }, .. })
        ));
        assert!(matches!(
            parse("Hits > -1 => reject"),
            Err(ParseError { kind: ParseErrorKind::InvalidNumber(_), .. })
        ));
    }

    #[test]
    fn test_error_position_points_at_token() {
        let Err(err) = parse("IP = 10.0.0.1 && Host = bare => reject") else {
            panic!("unquoted host must be rejected");
        };
        assert_eq!(err.position.offset, 24);
        assert_eq!(err.position.line, 1);
        assert_eq!(err.position.column, 25);
    }

    #[test]
    fn test_keywords_are_case_sensitive() -> Result<(), ParseError> {
        // lower case `ip` is just a header name
        let rule = parse("ip = \"1.2.3.4\" => reject")?;
        assert_eq!(
            rule.predicate(),
            &Predicate::HeaderEquals { name: "ip".to_string(), value: "1.2.3.4".to_string() }
        );
        Ok(())
    }

    #[test]
    fn test_parser_is_reusable_after_error() -> Result<(), ParseError> {
        let mut parser = Parser::new();
        assert!(parser.parse(1, "IP = => reject").is_err());
        let rule = parser.parse(2, "Hits > 10 => reject")?;
        assert_eq!(rule.id(), 2);
        assert_eq!(rule.predicate(), &Predicate::HitsGreaterThan(10));
        Ok(())
    }
}
