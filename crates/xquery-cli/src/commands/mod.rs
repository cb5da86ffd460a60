pub mod compile;
pub mod parse;
pub mod sniff;
