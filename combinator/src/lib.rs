//! Normalizes combinatory logic expressions against a set of user-defined
//! combinators such as `S x y z = x z (y z)`.

mod evaluator;
mod parser;
mod prelude;
mod rules;
mod term;

pub use evaluator::{
    flatten, reduce, reduce_bounded, reduce_once, steps, substitute, Bindings, ReduceError, Steps,
};
pub use parser::{
    lex, lexer, parse_definition, parse_definitions, parse_expression, parse_expressions,
    parse_rules, Token,
};
pub use prelude::{Error, Identifier, Span, Spanned};
pub use rules::{Rule, RuleSet, DEFAULT_RULES};
pub use term::{fold, Folder, Term, TermRef};

/// Reduces every expression in `expressions`, one per line, with the rules in
/// `definitions` and joins the results with newlines.
///
/// May not return when a rule set has no normal form for some expression.
pub fn run(definitions: &str, expressions: &str) -> Result<String, Vec<Error>> {
    let rules = parse_rules(definitions)?;
    let terms = parse_expressions(expressions)?;
    Ok(terms
        .iter()
        .map(|term| reduce(term, &rules).to_string())
        .collect::<Vec<_>>()
        .join("\n"))
}
