pub mod ast;
pub mod symbol_table;
