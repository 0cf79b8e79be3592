//! Query - Backend-neutral query trees
//!
//! Building a query never touches a backend. Trees are compiled into native
//! filters by a [`Translator`](crate::translate::Translator).

mod ast;
mod error;
mod operator;

pub use ast::{Condition, Group, LogicalOp, Query};
pub use error::QueryError;
pub use operator::{Anchor, Operator};
