use chumsky::{error::Error as _, prelude::*};

use crate::{
    prelude::*,
    rules::{Rule, RuleSet},
    term::{Term, TermRef},
};

pub trait SimpleParser<I: Clone + std::hash::Hash, O>:
    Parser<I, O, Error = Error<I>> + Clone
{
    #[allow(clippy::type_complexity)]
    fn spanned(self) -> chumsky::combinator::MapWithSpan<Self, fn(O, Span) -> Spanned<O>, O>
    where
        Self: Sized,
        I: std::cmp::Eq,
    {
        self.map_with_span(|value, span| Spanned { span, value })
    }
}
impl<I: Clone + std::hash::Hash, O, T> SimpleParser<I, O> for T where
    T: Parser<I, O, Error = Error<I>> + Clone
{
}

#[derive(PartialEq, Eq, Hash, Clone, derive_more::Display, Debug)]
pub enum Token {
    #[display(fmt = "(")]
    LParen,
    #[display(fmt = ")")]
    RParen,
    #[display(fmt = "=")]
    Equal,
    #[display(fmt = "newline")]
    Newline,
    #[display(fmt = "{}", "_0")]
    Name(Identifier),
}

fn inline_whitespace() -> impl SimpleParser<char, ()> {
    filter(|c: &char| c.is_whitespace() && *c != '\n')
        .repeated()
        .to(())
}

/// `letter (digit | "_" | "'")*`
///
/// Whitespace is insignificant, so it may separate the characters of a name:
/// `x 1` is the name `x1`, while `xy` is the two names `x` and `y`.
pub fn name() -> impl SimpleParser<char, Identifier> {
    let start = filter(|c: &char| c.is_ascii_alphabetic());
    let rest = filter(|c: &char| c.is_ascii_digit() || *c == '_' || *c == '\'');
    start
        .chain(inline_whitespace().ignore_then(rest).repeated())
        .collect::<String>()
        .map(|name: String| Identifier::from(name))
        .labelled("name")
}

pub fn lexer() -> impl SimpleParser<char, Vec<Spanned<Token>>> {
    let token = choice((
        just('\n').to(Token::Newline),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('=').to(Token::Equal),
        name().map(Token::Name),
    ));
    inline_whitespace()
        .ignore_then(token.spanned().then_ignore(inline_whitespace()).repeated())
        .then_ignore(end())
}

pub fn lex(input: &str) -> Result<Vec<Spanned<Token>>> {
    lexer().parse(input).map_err(|es| {
        es.into_iter()
            .map(|e| e.map(|c| c.to_string()))
            .collect::<Vec<_>>()
    })
}

fn unexpected(token: &Spanned<Token>, expected: &[&str]) -> Error {
    Error::expected_input_found(
        token.span(),
        expected.iter().map(|e| Some(e.to_string())),
        Some(token.value().to_string()),
    )
}

fn group(elements: Vec<TermRef>) -> Option<TermRef> {
    let mut elements = elements.into_iter();
    let head = elements.next()?;
    Some(if elements.as_slice().is_empty() {
        head
    } else {
        Term::application(std::iter::once(head).chain(elements))
    })
}

enum Entry {
    Open(Span),
    Term(TermRef),
}

fn expression(tokens: &[Spanned<Token>], end: Span) -> Result<TermRef, Error> {
    let mut stack = vec![];
    for token in tokens {
        match token.value() {
            Token::LParen => stack.push(Entry::Open(token.span())),
            Token::RParen => {
                let mut elements = vec![];
                loop {
                    match stack.pop() {
                        Some(Entry::Open(_)) => break,
                        Some(Entry::Term(term)) => elements.push(term),
                        None => {
                            return Err(Error::custom(
                                token.span(),
                                "Unmatched closing parenthesis",
                            ))
                        }
                    }
                }
                elements.reverse();
                let grouped = group(elements)
                    .ok_or_else(|| Error::custom(token.span(), "Empty parentheses"))?;
                stack.push(Entry::Term(grouped));
            }
            Token::Name(name) => stack.push(Entry::Term(Term::reference(name.clone()))),
            Token::Equal | Token::Newline => return Err(unexpected(token, &["name", "(", ")"])),
        }
    }
    let mut terms = Vec::with_capacity(stack.len());
    for entry in stack {
        match entry {
            Entry::Open(span) => {
                return Err(Error::unclosed_delimiter(
                    span,
                    Token::LParen.to_string(),
                    end,
                    Token::RParen.to_string(),
                    None,
                ))
            }
            Entry::Term(term) => terms.push(term),
        }
    }
    group(terms).ok_or_else(|| {
        Error::expected_input_found(end, [Some("name".to_string()), Some("(".to_string())], None)
    })
}

/// `name params = body`
fn definition(tokens: &[Spanned<Token>], end: Span) -> Result<Rule, Error> {
    let Some(equal) = tokens.iter().position(|t| t.value == Token::Equal) else {
        return Err(Error::expected_input_found(
            end,
            [Some(Token::Equal.to_string())],
            None,
        ));
    };
    let mut names: Vec<Identifier> = vec![];
    for token in &tokens[..equal] {
        let Token::Name(name) = token.value() else {
            return Err(unexpected(token, &["name", "="]));
        };
        if names.iter().skip(1).any(|n| n == name) {
            return Err(Error::custom(
                token.span(),
                format!("Duplicate parameter {name}"),
            ));
        }
        names.push(name.clone());
    }
    let Some((name, parameters)) = names.split_first() else {
        return Err(unexpected(&tokens[equal], &["name"]));
    };
    let body = expression(&tokens[equal + 1..], end)?;
    Ok(Rule {
        name: name.clone(),
        parameters: parameters.to_vec(),
        body,
    })
}

fn lines<'a>(
    tokens: &'a [Spanned<Token>],
) -> impl Iterator<Item = (&'a [Spanned<Token>], Span)> + 'a {
    tokens
        .split(|t| t.value == Token::Newline)
        .filter_map(|line| {
            let end = line.last()?.span.end;
            Some((line, end..end + 1))
        })
}

fn collect<T>(results: impl Iterator<Item = Result<T, Error>>) -> Result<Vec<T>> {
    let mut values = vec![];
    let mut errors = vec![];
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

pub fn parse_expression(input: &str) -> Result<TermRef> {
    let tokens = lex(input)?;
    let len = input.chars().count();
    expression(&tokens, len..len + 1).map_err(|e| vec![e])
}

pub fn parse_expressions(input: &str) -> Result<Vec<TermRef>> {
    let tokens = lex(input)?;
    collect(lines(&tokens).map(|(line, end)| expression(line, end)))
}

pub fn parse_definition(input: &str) -> Result<Rule> {
    let tokens = lex(input)?;
    let len = input.chars().count();
    definition(&tokens, len..len + 1).map_err(|e| vec![e])
}

pub fn parse_definitions(input: &str) -> Result<Vec<Rule>> {
    let tokens = lex(input)?;
    collect(lines(&tokens).map(|(line, end)| definition(line, end)))
}

/// Builds a rule set from a definitions document. Later definitions replace
/// earlier ones with the same name.
pub fn parse_rules(input: &str) -> Result<RuleSet> {
    Ok(parse_definitions(input)?.into_iter().collect())
}

#[cfg(test)]
mod test {
    use chumsky::error::SimpleReason;

    use super::*;
    use crate::flatten;

    macro_rules! r {
        ($name:expr) => {
            Term::reference($name)
        };
    }
    macro_rules! app {
        ($($element:expr),+ $(,)?) => {
            Term::application([$($element),+])
        };
    }

    fn tokens(s: &str) -> Vec<Token> {
        lex(s).unwrap().into_iter().map(|t| t.value).collect()
    }
    fn ident(s: &str) -> Token {
        Token::Name(s.into())
    }

    #[test]
    fn test_lexer() {
        assert_eq!(
            tokens("S x y z = x z (y z)"),
            vec![
                ident("S"),
                ident("x"),
                ident("y"),
                ident("z"),
                Token::Equal,
                ident("x"),
                ident("z"),
                Token::LParen,
                ident("y"),
                ident("z"),
                Token::RParen,
            ]
        );
        assert_eq!(tokens("SKK"), vec![ident("S"), ident("K"), ident("K")]);
        assert_eq!(tokens("x1 y_ z'"), vec![ident("x1"), ident("y_"), ident("z'")]);
        assert_eq!(tokens("x 1 2"), vec![ident("x12")]);
        assert_eq!(
            tokens("  a\n\n b  "),
            vec![ident("a"), Token::Newline, Token::Newline, ident("b")]
        );
        assert!(tokens("").is_empty());
        assert!(lex("1x").is_err());
        assert!(lex("a + b").is_err());
    }

    #[test]
    fn test_spans_point_into_the_source() {
        let spans = lex("f  (x)")
            .unwrap()
            .iter()
            .map(Spanned::span)
            .collect::<Vec<_>>();
        assert_eq!(spans, vec![0..1, 3..4, 4..5, 5..6]);
    }

    #[test]
    fn test_parse_expression() {
        assert_eq!(parse_expression("x").unwrap(), r!("x"));
        assert_eq!(
            parse_expression("a b c").unwrap(),
            app!(r!("a"), r!("b"), r!("c"))
        );
        assert_eq!(
            parse_expression("((a b) c)").unwrap(),
            app!(app!(r!("a"), r!("b")), r!("c"))
        );
        assert_eq!(
            flatten(&parse_expression("((a b) c)").unwrap()),
            parse_expression("a b c").unwrap()
        );
        assert_eq!(
            parse_expression("x z (y z)").unwrap(),
            app!(r!("x"), r!("z"), app!(r!("y"), r!("z")))
        );
    }

    #[test]
    fn test_parentheses_around_a_single_term_are_transparent() {
        assert_eq!(parse_expression("(a)").unwrap(), r!("a"));
        assert_eq!(parse_expression("((a))").unwrap(), r!("a"));
        assert_eq!(
            parse_expression("((a b))").unwrap(),
            app!(r!("a"), r!("b"))
        );
        assert_eq!(
            parse_expression("f (a) b").unwrap(),
            app!(r!("f"), r!("a"), r!("b"))
        );
    }

    #[test]
    fn test_round_trip() {
        for source in ["x", "S K K a", "x z (y z)", "(f a) (g (h b c)) d", "K' x1 (y_ z)"] {
            let term = parse_expression(source).unwrap();
            assert_eq!(term.to_string(), source);
            assert_eq!(parse_expression(&term.to_string()).unwrap(), term);
        }
    }

    #[test]
    fn test_malformed_expressions() {
        let es = parse_expression("a b)").unwrap_err();
        assert_eq!(es.len(), 1);
        assert_eq!(es[0].span(), 3..4);
        assert!(matches!(es[0].reason(), SimpleReason::Custom(_)));

        let es = parse_expression("f (a b").unwrap_err();
        assert!(matches!(
            es[0].reason(),
            SimpleReason::Unclosed { span, .. } if *span == (2..3)
        ));

        assert!(parse_expression("f ()").is_err());
        assert!(parse_expression("").is_err());
        assert!(parse_expression("   ").is_err());
        assert!(parse_expression("a = b").is_err());
        assert!(parse_expression("a\nb").is_err());
    }

    #[test]
    fn test_parse_expressions() {
        let terms = parse_expressions("S K K a\n\n  \nI b\n").unwrap();
        assert_eq!(
            terms,
            vec![app!(r!("S"), r!("K"), r!("K"), r!("a")), app!(r!("I"), r!("b"))]
        );
        assert!(parse_expressions("").unwrap().is_empty());

        let es = parse_expressions("a)\nb\n(c").unwrap_err();
        assert_eq!(es.len(), 2);
        assert_eq!(es[0].span(), 1..2);
    }

    #[test]
    fn test_parse_definition() {
        let rule = parse_definition("S x y z = x z (y z)").unwrap();
        assert_eq!(rule.name.as_ref(), "S");
        assert_eq!(
            rule.parameters,
            vec![Identifier::from("x"), "y".into(), "z".into()]
        );
        assert_eq!(rule.arity(), 3);
        assert_eq!(rule.body.to_string(), "x z (y z)");

        let rule = parse_definition("T = K").unwrap();
        assert_eq!(rule.arity(), 0);
        assert_eq!(rule.body, r!("K"));
    }

    #[test]
    fn test_malformed_definitions() {
        assert!(parse_definition("S x y z").is_err());
        assert!(parse_definition("= x").is_err());
        assert!(parse_definition("K x y =").is_err());
        assert!(parse_definition("(K x) y = x").is_err());
        assert!(parse_definition("K x x = x").is_err());
        assert!(parse_definition("K x y = x = y").is_err());
    }

    #[test]
    fn test_parse_rules() {
        let rules = parse_rules("I x = x\n\nK x y = x\nI y = K y y\n").unwrap();
        assert_eq!(rules.len(), 2);
        let i = rules.get("I").unwrap();
        assert_eq!(i.to_string(), "I y = K y y");

        let es = parse_rules("I x = x\nK x y\nB (x) = x").unwrap_err();
        assert_eq!(es.len(), 2);
    }
}
