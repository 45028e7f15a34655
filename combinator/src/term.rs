use std::rc::Rc;

use crate::prelude::*;

pub type TermRef = Rc<Term>;

/// A combinatory logic term.
///
/// Applications are stored flat: `f a b c` is one `Application` of four elements
/// rather than nested pairs. Parsing may still produce an application whose head
/// is itself an application (`(f a) b`); [`crate::flatten`] restores the flat shape.
///
/// Equality is structural and order sensitive. It performs no renaming.
///
/// Rendering, comparing and dropping walk the term with an explicit stack, so
/// arbitrarily deep terms are safe to handle.
#[derive(Clone, Debug)]
pub enum Term {
    /// `x`
    Reference(Identifier),
    /// `t t ...`, never empty
    Application(Vec<TermRef>),
}

impl Term {
    pub fn reference(name: impl Into<Identifier>) -> TermRef {
        Rc::new(Term::Reference(name.into()))
    }

    pub fn application(elements: impl IntoIterator<Item = TermRef>) -> TermRef {
        let elements: Vec<_> = elements.into_iter().collect();
        debug_assert!(!elements.is_empty(), "an application needs at least one element");
        Rc::new(Term::Application(elements))
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((lhs, rhs)) = pending.pop() {
            if std::ptr::eq(lhs, rhs) {
                continue;
            }
            match (lhs, rhs) {
                (Term::Reference(a), Term::Reference(b)) if a == b => {}
                (Term::Application(a), Term::Application(b)) if a.len() == b.len() => {
                    pending.extend(a.iter().zip(b).map(|(a, b)| (a.as_ref(), b.as_ref())));
                }
                _ => return false,
            }
        }
        true
    }
}

impl Eq for Term {}

impl Drop for Term {
    fn drop(&mut self) {
        let Term::Application(elements) = self else {
            return;
        };
        let mut pending = std::mem::take(elements);
        while let Some(element) = pending.pop() {
            // Only the last owner tears a node down; its children move here first.
            if let Ok(Term::Application(children)) = Rc::try_unwrap(element).as_mut() {
                pending.append(children);
            }
        }
    }
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        enum Piece<'a> {
            Term(&'a Term),
            Text(&'static str),
        }
        let mut pending = vec![Piece::Term(self)];
        while let Some(piece) = pending.pop() {
            match piece {
                Piece::Text(text) => f.write_str(text)?,
                Piece::Term(Term::Reference(name)) => f.write_str(name)?,
                Piece::Term(Term::Application(elements)) => {
                    for (i, element) in elements.iter().enumerate().rev() {
                        match element.as_ref() {
                            Term::Reference(_) => pending.push(Piece::Term(element)),
                            Term::Application(_) => {
                                pending.push(Piece::Text(")"));
                                pending.push(Piece::Term(element));
                                pending.push(Piece::Text("("));
                            }
                        }
                        if i > 0 {
                            pending.push(Piece::Text(" "));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Bottom-up transformation of a term.
///
/// The elements handed to [`Folder::fold_application`] have already been folded,
/// left to right.
pub trait Folder {
    fn fold_reference(&mut self, term: &TermRef, name: &Identifier) -> TermRef;
    fn fold_application(&mut self, term: &TermRef, elements: Vec<TermRef>) -> TermRef;
}

/// Runs `folder` over `term` in post-order with an explicit work stack, so deeply
/// nested terms do not grow the call stack.
pub fn fold(term: &TermRef, folder: &mut impl Folder) -> TermRef {
    enum Frame<'a> {
        Enter(&'a TermRef),
        Exit(&'a TermRef, usize),
    }
    let mut work = vec![Frame::Enter(term)];
    let mut done: Vec<TermRef> = vec![];
    while let Some(frame) = work.pop() {
        match frame {
            Frame::Enter(current) => match current.as_ref() {
                Term::Reference(name) => done.push(folder.fold_reference(current, name)),
                Term::Application(elements) => {
                    work.push(Frame::Exit(current, elements.len()));
                    work.extend(elements.iter().rev().map(Frame::Enter));
                }
            },
            Frame::Exit(current, len) => {
                let elements = done.split_off(done.len() - len);
                let folded = folder.fold_application(current, elements);
                done.push(folded);
            }
        }
    }
    debug_assert_eq!(done.len(), 1);
    done.pop().expect("Something went wrong: folding produced no term")
}

/// Rebuilds `term` from already folded elements, reusing it when nothing changed.
pub(crate) fn rebuild(term: &TermRef, elements: Vec<TermRef>) -> TermRef {
    if let Term::Application(original) = term.as_ref() {
        if original.len() == elements.len()
            && original.iter().zip(&elements).all(|(a, b)| Rc::ptr_eq(a, b))
        {
            return term.clone();
        }
    }
    Term::application(elements)
}
