pub mod job;
pub mod parser;
pub mod tokenizer;
pub mod variable_expansion;
