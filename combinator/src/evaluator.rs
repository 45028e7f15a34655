use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    prelude::*,
    rules::RuleSet,
    term::{fold, rebuild, Folder, Term, TermRef},
};

pub type Bindings = HashMap<Identifier, TermRef>;

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("No fixpoint within {limit} steps, stopped at `{term}`")]
    StepLimit { limit: usize, term: TermRef },
}

/// Rule bodies have no inner binders, so nothing needs renaming.
pub fn substitute(term: &TermRef, bindings: &Bindings) -> TermRef {
    struct Substitute<'a>(&'a Bindings);
    impl<'a> Folder for Substitute<'a> {
        fn fold_reference(&mut self, term: &TermRef, name: &Identifier) -> TermRef {
            self.0.get(name).cloned().unwrap_or_else(|| term.clone())
        }
        fn fold_application(&mut self, term: &TermRef, elements: Vec<TermRef>) -> TermRef {
            rebuild(term, elements)
        }
    }
    fold(term, &mut Substitute(bindings))
}

/// Splices applications in head position into their parent: `(f a) b` becomes `f a b`.
pub fn flatten(term: &TermRef) -> TermRef {
    struct Flatten;
    impl Folder for Flatten {
        fn fold_reference(&mut self, term: &TermRef, _: &Identifier) -> TermRef {
            term.clone()
        }
        fn fold_application(&mut self, term: &TermRef, elements: Vec<TermRef>) -> TermRef {
            if let Some(Term::Application(head)) = elements.first().map(|first| first.as_ref()) {
                return Term::application(head.iter().chain(&elements[1..]).cloned());
            }
            rebuild(term, elements)
        }
    }
    fold(term, &mut Flatten)
}

fn rewrite(rules: &RuleSet, elements: &[TermRef]) -> Option<TermRef> {
    let (head, tail) = elements.split_first()?;
    let Term::Reference(name) = head.as_ref() else {
        return None;
    };
    let rule = rules.get(name)?;
    if tail.len() < rule.arity() {
        return None;
    }
    let (arguments, leftover) = tail.split_at(rule.arity());
    let bindings: Bindings = rule
        .parameters
        .iter()
        .cloned()
        .zip(arguments.iter().cloned())
        .collect();
    let result = substitute(&rule.body, &bindings);
    Some(if leftover.is_empty() {
        result
    } else {
        Term::application(std::iter::once(result).chain(leftover.iter().cloned()))
    })
}

/// One rewrite attempt per application, innermost first.
pub fn reduce_once(term: &TermRef, rules: &RuleSet) -> TermRef {
    struct Rewrite<'a>(&'a RuleSet);
    impl<'a> Folder for Rewrite<'a> {
        fn fold_reference(&mut self, term: &TermRef, _: &Identifier) -> TermRef {
            term.clone()
        }
        fn fold_application(&mut self, term: &TermRef, elements: Vec<TermRef>) -> TermRef {
            rewrite(self.0, &elements).unwrap_or_else(|| rebuild(term, elements))
        }
    }
    fold(term, &mut Rewrite(rules))
}

/// Successive states of a reduction. The last item is the fixpoint.
pub struct Steps<'a> {
    rules: &'a RuleSet,
    last: TermRef,
    taken: usize,
    finished: bool,
}

pub fn steps<'a>(term: &TermRef, rules: &'a RuleSet) -> Steps<'a> {
    Steps {
        rules,
        last: term.clone(),
        taken: 0,
        finished: false,
    }
}

impl<'a> Steps<'a> {
    pub fn run(
        mut self,
        limit: Option<usize>,
        mut on_step: impl FnMut(usize, &TermRef),
    ) -> Result<TermRef, ReduceError> {
        while let Some(term) = self.next() {
            on_step(self.taken, &term);
            if let Some(limit) = limit {
                if self.taken > limit {
                    debug!(limit, "step limit reached");
                    return Err(ReduceError::StepLimit { limit, term });
                }
            }
        }
        Ok(self.last)
    }
}

impl<'a> Iterator for Steps<'a> {
    type Item = TermRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let next = reduce_once(&flatten(&self.last), self.rules);
        if next == self.last {
            self.finished = true;
            return None;
        }
        self.taken += 1;
        trace!(step = self.taken, term = %next, "rewrite pass");
        self.last = next.clone();
        Some(next)
    }
}

impl<'a> std::iter::FusedIterator for Steps<'a> {}

/// Repeats flatten + [`reduce_once`] until a pass leaves the term unchanged.
///
/// Only consecutive states are compared, so a rule set that cycles through
/// distinct terms (`S I I (S I I)`) makes this loop forever.
pub fn reduce(term: &TermRef, rules: &RuleSet) -> TermRef {
    steps(term, rules).last().unwrap_or_else(|| term.clone())
}

/// Like [`reduce`], but fails once more than `limit` passes changed the term.
pub fn reduce_bounded(
    term: &TermRef,
    rules: &RuleSet,
    limit: usize,
) -> Result<TermRef, ReduceError> {
    steps(term, rules).run(Some(limit), |_, _| ())
}
