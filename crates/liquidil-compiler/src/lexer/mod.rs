//! Lexing layer: C1 splits template source into RAW/VAR/TAG tokens, C2
//! tokenizes the expression text inside a VAR or tag's arguments.

pub mod expr;
pub mod template;
