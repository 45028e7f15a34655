use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use ariadne::{Color, Fmt, Label, Report, ReportKind, Source};
use clap::Parser;
use combinator::{
    flatten, parse_definitions, parse_expressions, parse_rules, reduce_once, steps, Error,
    ReduceError, RuleSet, Span, Term,
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use util::repl::{self, Flow};

/// Normalizes combinatory logic expressions.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Combinator definitions, one per line. Defaults to S, K, I, B, C and W.
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Expressions to normalize, one per line. Starts a REPL when omitted.
    input: Option<PathBuf>,

    /// Give up on an expression after this many rewrite passes.
    #[arg(short = 'n', long)]
    max_steps: Option<usize>,

    /// Print every intermediate term.
    #[arg(short, long)]
    trace: bool,
}

fn build_report(e: Error) -> Report<Span> {
    use chumsky::error::SimpleReason;
    let found = e
        .found()
        .cloned()
        .unwrap_or_else(|| "end of the line".to_string());
    let report = Report::build(ReportKind::Error, (), e.span().start);
    match e.reason() {
        SimpleReason::Unexpected => {
            let expected = e
                .expected()
                .map(|t| t.as_deref().unwrap_or("end of the line"))
                .collect::<Vec<_>>()
                .join(", ");
            let expected = if expected.is_empty() {
                "something else"
            } else {
                &expected
            };
            report
                .with_message(format!("Unexpected {found}, expected {expected}"))
                .with_label(
                    Label::new(e.span())
                        .with_message(format!("Unexpected {}", found.fg(Color::Red)))
                        .with_color(Color::Red),
                )
        }
        SimpleReason::Unclosed { span, delimiter } => report
            .with_message(format!("Unclosed delimiter {}", delimiter.fg(Color::Yellow)))
            .with_label(
                Label::new(span.clone())
                    .with_message("Opened here")
                    .with_color(Color::Yellow),
            )
            .with_label(
                Label::new(e.span())
                    .with_message(format!("Must be closed before {}", found.fg(Color::Red)))
                    .with_color(Color::Red),
            ),
        SimpleReason::Custom(msg) => report.with_message(msg).with_label(
            Label::new(e.span())
                .with_message(format!("{}", msg.fg(Color::Red)))
                .with_color(Color::Red),
        ),
    }
    .finish()
}

fn report(source: &str, errors: Vec<Error>) -> Result<()> {
    for e in errors {
        build_report(e).eprint(Source::from(source))?;
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_rules(path: &Path) -> Result<RuleSet> {
    let source = read(path)?;
    match parse_rules(&source) {
        Ok(rules) => {
            info!(count = rules.len(), path = %path.display(), "loaded combinators");
            Ok(rules)
        }
        Err(es) => {
            report(&source, es)?;
            bail!("Malformed definitions in {}", path.display())
        }
    }
}

fn run_batch(rules: &RuleSet, input: &Path, limit: Option<usize>, trace: bool) -> Result<()> {
    let source = read(input)?;
    let terms = match parse_expressions(&source) {
        Ok(terms) => terms,
        Err(es) => {
            report(&source, es)?;
            bail!("Malformed expressions in {}", input.display())
        }
    };
    let mut diverged = 0;
    for term in &terms {
        let result = steps(term, rules).run(limit, |step, term| {
            if trace {
                eprintln!("{step:>6}: {term}");
            }
        });
        match result {
            Ok(term) => println!("{term}"),
            Err(e) => {
                eprintln!("{}", gave_up(term, &e));
                diverged += 1;
            }
        }
    }
    if diverged > 0 {
        bail!("{diverged} of {} expressions did not converge", terms.len());
    }
    Ok(())
}

fn gave_up(term: &Term, e: &ReduceError) -> String {
    format!("{term}: {e}")
}

struct Repl {
    rules: RuleSet,
    limit: Option<usize>,
}
impl Repl {
    fn define(&mut self, input: &str) -> Result<(), Vec<Error>> {
        for rule in parse_definitions(input)? {
            println!("{rule}");
            self.rules.insert(rule);
        }
        Ok(())
    }

    fn parse(input: &str) -> Result<(), Vec<Error>> {
        for term in parse_expressions(input)? {
            println!("{term:?}");
        }
        Ok(())
    }

    fn flatten(input: &str) -> Result<(), Vec<Error>> {
        for term in parse_expressions(input)? {
            println!("{}", flatten(&term));
        }
        Ok(())
    }

    fn step(&self, input: &str) -> Result<(), Vec<Error>> {
        for term in parse_expressions(input)? {
            println!("{}", reduce_once(&flatten(&term), &self.rules));
        }
        Ok(())
    }

    fn normalize(&self, input: &str, trace: bool) -> Result<(), Vec<Error>> {
        for term in parse_expressions(input)? {
            let result = steps(&term, &self.rules).run(self.limit, |step, term| {
                if trace {
                    println!("{step:>6}: {term}");
                }
            });
            match result {
                Ok(term) => println!("{term}"),
                Err(e) => eprintln!("{}", gave_up(&term, &e)),
            }
        }
        Ok(())
    }

    fn show_rules(&self) {
        for rule in self.rules.iter() {
            println!("{rule}");
        }
    }

    fn load(&mut self, path: &str) -> Result<()> {
        let path = Path::new(path);
        let source = match read(path) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("{e:#}");
                return Ok(());
            }
        };
        match parse_rules(&source) {
            Ok(rules) => {
                println!("Loaded {} combinators", rules.len());
                self.rules = rules;
            }
            Err(es) => report(&source, es)?,
        }
        Ok(())
    }

    fn set_limit(&mut self, input: &str) {
        match input {
            "" | "off" => self.limit = None,
            n => match n.parse() {
                Ok(limit) => self.limit = Some(limit),
                Err(e) => {
                    eprintln!("Invalid limit {n}: {e}");
                    return;
                }
            },
        }
        match self.limit {
            Some(limit) => println!("Giving up after {limit} steps"),
            None => println!("No step limit"),
        }
    }

    fn show_help() {
        println!(
            "{}",
            r#"
term                  -- same as :eval term
name params = body   -- define a combinator, replacing one with the same name
:parse     term       -- show the parsed term
:flatten   term       -- show the flattened term
:step      term       -- show the result of one rewrite pass
:trace     term       -- show every intermediate term
:eval      term       -- show the normal form
:rules                -- list the combinators
:load      file       -- replace the combinators with the definitions in file
:reset                -- restore the default combinators
:limit     n | off    -- give up after n rewrite passes
:help                 -- show this message
:quit                 -- leave
        "#
            .trim()
        );
    }

    fn handle_repl_input(&mut self, input: &str) -> Result<Flow> {
        let (cmd, input) = match input.trim_start().strip_prefix(':') {
            Some(stripped) => stripped
                .trim_start()
                .split_once(char::is_whitespace)
                .unwrap_or((stripped.trim(), "")),
            None if input.contains('=') => ("define", input),
            None => ("", input),
        };
        let input = input.trim();
        let result = match cmd {
            "define" => self.define(input),
            "p" | "parse" => Self::parse(input),
            "f" | "flatten" => Self::flatten(input),
            "s" | "step" => self.step(input),
            "t" | "trace" => self.normalize(input, true),
            "" | "e" | "eval" | "evaluate" => self.normalize(input, false),
            "r" | "rules" => {
                self.show_rules();
                Ok(())
            }
            "l" | "load" => {
                self.load(input)?;
                Ok(())
            }
            "reset" => {
                self.rules = RuleSet::standard();
                Ok(())
            }
            "limit" => {
                self.set_limit(input);
                Ok(())
            }
            "h" | "he" | "hel" | "help" => {
                Self::show_help();
                Ok(())
            }
            "q" | "quit" => return Ok(Flow::Quit),
            _ => {
                eprintln!("Unknown command {cmd}");
                Self::show_help();
                Ok(())
            }
        };
        if let Err(es) = result {
            report(input, es)?;
        }
        Ok(Flow::Continue)
    }
}
impl repl::Repl for Repl {
    type Error = anyhow::Error;
    const HISTORY: Option<&'static str> = Some("/tmp/combinator.history");
    fn evaluate(&mut self, input: String) -> Result<Flow, Self::Error> {
        if input.trim().is_empty() {
            return Ok(Flow::Continue);
        }
        self.handle_repl_input(&input)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let rules = match &cli.rules {
        Some(path) => load_rules(path)?,
        None => RuleSet::standard(),
    };
    if let Some(input) = &cli.input {
        return run_batch(&rules, input, cli.max_steps, cli.trace);
    }

    println!("Hi, this is a combinatory logic REPL. :h to show help");
    println!();
    repl::start_repl(Repl {
        rules,
        limit: cli.max_steps,
    })?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn repl() -> Repl {
        Repl {
            rules: RuleSet::standard(),
            limit: None,
        }
    }

    #[test]
    fn test_definitions_extend_the_rules() {
        let mut repl = repl();
        assert_eq!(repl.handle_repl_input("M x = x x").unwrap(), Flow::Continue);
        assert_eq!(repl.rules.get("M").unwrap().to_string(), "M x = x x");
        repl.handle_repl_input("K x y = y\nT = K").unwrap();
        assert_eq!(repl.rules.get("K").unwrap().to_string(), "K x y = y");
        assert_eq!(repl.rules.len(), 8);

        repl.handle_repl_input(":reset").unwrap();
        assert!(repl.rules.get("M").is_none());
        assert_eq!(repl.rules.len(), 6);
    }

    #[test]
    fn test_malformed_input_is_reported_not_raised() {
        let mut repl = repl();
        assert!(repl.handle_repl_input("K x x = x").is_ok());
        assert!(repl.handle_repl_input("S (K").is_ok());
        assert_eq!(repl.rules.len(), 6);
    }

    #[test]
    fn test_limit() {
        let mut repl = repl();
        repl.handle_repl_input(":limit 20").unwrap();
        assert_eq!(repl.limit, Some(20));
        repl.handle_repl_input(":limit many").unwrap();
        assert_eq!(repl.limit, Some(20));
        repl.handle_repl_input(":limit off").unwrap();
        assert_eq!(repl.limit, None);
    }

    #[test]
    fn test_quit() {
        assert_eq!(repl().handle_repl_input(":q").unwrap(), Flow::Quit);
        assert_eq!(repl().handle_repl_input("  :quit").unwrap(), Flow::Quit);
    }

    #[test]
    fn test_load_missing_file_keeps_the_session() {
        let mut repl = repl();
        repl.handle_repl_input("M x = x x").unwrap();
        assert_eq!(
            repl.handle_repl_input(":load /nonexistent/rules.txt").unwrap(),
            Flow::Continue
        );
        assert_eq!(repl.rules.len(), 7);
        assert!(repl.rules.get("M").is_some());
    }

    #[test]
    fn test_gave_up_names_the_expression() {
        let term = parse_expressions("S I I (S I I)").unwrap().remove(0);
        let e = steps(&term, &RuleSet::standard()).run(Some(3), |_, _| {}).unwrap_err();
        let message = gave_up(&term, &e);
        assert!(message.starts_with("S I I (S I I): No fixpoint within 3 steps"));
    }
}
