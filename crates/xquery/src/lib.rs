//! XQuery front end: encoding sniffer, recognizer producing a concrete
//! syntax tree, and a tree compiler lowering that tree to an expression
//! graph checked against a static context.

pub mod compiler;
pub mod consts;
pub mod context;
pub mod cst;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod qname;
pub mod sniffer;

pub use compiler::{CompileOptions, compile, compile_cst, compile_module, compile_module_with_options};
pub use context::{InMemoryModuleResolver, ModuleExports, ModuleResolver, StaticContext, StaticContextBuilder};
pub use cst::{Cst, NodeId, NodeKind};
pub use error::{Error, ErrorCode};
pub use expr::{CompiledModule, Expr, ExprGraph, ExprId};
pub use parser::{ParseOptions, ParseOutcome, parse_expression, parse_module, parse_module_with_options};
pub use qname::{ExpandedName, QName};
pub use sniffer::{DeclScanner, ScanError, sniff_encoding, sniff_encoding_bytes};
