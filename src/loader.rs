//! Function loader — turns snippet source into a callable sample function.

use std::fmt;

use crate::ast::Snippet;
use crate::compiler;
use crate::dsp::interpreter::Scratch;
use crate::dsp::knobs::{KnobRegistry, KnobSlot};
use crate::dsp::notes::ActiveNotes;
use crate::dsp::state::{FieldSlot, StateStore};
use crate::error::{CompileError, RuntimeFault};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::value::Value;

/// Position of the current call on the engine's timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    pub sample_rate: f64,
    /// Frames rendered before this one.
    pub frame: u64,
}

impl Clock {
    pub fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }
}

/// Everything one sample call may read or write.
///
/// `fields` and `knob_slots` are positional: entry `i` is the slot bound to the
/// function's `i`-th field or knob name.
pub struct CallContext<'a> {
    pub state: &'a mut StateStore,
    pub fields: &'a [FieldSlot],
    pub knobs: &'a KnobRegistry,
    pub knob_slots: &'a [KnobSlot],
    pub notes: &'a ActiveNotes,
    pub clock: Clock,
    pub scratch: &'a mut Scratch,
}

/// A compiled snippet the engine can call once per frame.
pub trait SampleFunction: Send + fmt::Debug {
    /// Compute one sample.
    fn evaluate(&self, ctx: &mut CallContext<'_>) -> Result<Value, RuntimeFault>;

    /// Persistent field names the function reads or writes, in first-use order.
    fn fields(&self) -> &[String];

    /// Knob names the function reads, in first-use order.
    fn required_knobs(&self) -> &[String];
}

/// Lex and parse snippet source.
pub fn parse(source: &str) -> Result<Snippet, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    Ok(parser.parse_snippet()?)
}

/// Compile snippet source into a sample function.
pub fn load(source: &str) -> Result<Box<dyn SampleFunction>, CompileError> {
    let snippet = parse(source)?;
    let program = compiler::compile(&snippet)?;
    Ok(Box::new(program))
}
