use std::rc::Rc;

pub type Identifier = Rc<str>;

pub type Span = std::ops::Range<usize>;

#[derive(Clone, derive_more::Display, Debug)]
#[display(bound = "T: std::fmt::Display")]
#[display(fmt = "{value}")]
pub struct Spanned<T> {
    pub span: Span,
    pub value: T,
}
impl<T> Spanned<T> {
    pub fn value(&self) -> &T {
        &self.value
    }
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

pub use chumsky::error::Error as _;
pub type Error<I = String> = chumsky::error::Simple<I, Span>;
pub type Result<T, E = Vec<Error>> = std::result::Result<T, E>;
