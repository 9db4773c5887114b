//! Tree-walking evaluator for compiled snippets.
//!
//! Runs on the audio path: no allocation per call beyond growing the reusable
//! value stack, and every loop iteration and statement is counted against the
//! per-sample step budget so a runaway snippet faults instead of hanging.

use crate::ast::LogicalOp;
use crate::compiler::{MathFn, Node, Op, Place, Program, Routine, Var};
use crate::config::EngineConfig;
use crate::dsp::notes;
use crate::error::{FaultKind, RuntimeFault};
use crate::loader::{CallContext, SampleFunction};
use crate::value::{self, Value};

/// Interpreter buffers reused across calls.
#[derive(Debug)]
pub struct Scratch {
    stack: Vec<Value>,
    steps: u64,
    depth: usize,
    max_steps: u64,
    max_depth: usize,
    rng: fastrand::Rng,
}

impl Scratch {
    pub fn new(config: &EngineConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        Scratch {
            stack: Vec::with_capacity(64),
            steps: 0,
            depth: 0,
            max_steps: config.max_steps_per_sample,
            max_depth: config.max_call_depth,
            rng,
        }
    }

    /// Release stack capacity grown by deep recursion.
    pub fn compact(&mut self) {
        self.stack.clear();
        self.stack.shrink_to(64);
    }

    /// Steps taken by the most recent call.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

enum Flow {
    Next,
    Break,
    Continue,
    Return(Value),
}

struct Vm<'p, 'c, 'a> {
    program: &'p Program,
    ctx: &'c mut CallContext<'a>,
}

impl SampleFunction for Program {
    fn evaluate(&self, ctx: &mut CallContext<'_>) -> Result<Value, RuntimeFault> {
        let scratch = &mut *ctx.scratch;
        scratch.steps = 0;
        scratch.depth = 0;
        scratch.stack.clear();
        scratch.stack.resize(self.main.locals, Value::Undefined);

        let mut vm = Vm { program: self, ctx };
        match vm.exec_block(&self.main.body, 0)? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn required_knobs(&self) -> &[String] {
        &self.knobs
    }
}

impl Vm<'_, '_, '_> {
    fn tick(&mut self) -> Result<(), RuntimeFault> {
        let scratch = &mut *self.ctx.scratch;
        scratch.steps += 1;
        if scratch.steps > scratch.max_steps {
            return Err(RuntimeFault {
                kind: FaultKind::StepBudget,
                message: format!("sample call exceeded {} steps", scratch.max_steps),
            });
        }
        Ok(())
    }

    fn slot(var: Var, base: usize) -> usize {
        match var {
            Var::Local(slot) => base + slot,
            Var::Global(slot) => slot,
        }
    }

    fn read(&self, place: Place, base: usize) -> Value {
        match place {
            Place::Var(var) => self.ctx.scratch.stack[Self::slot(var, base)].clone(),
            Place::Field(idx) => self.ctx.state.read(self.ctx.fields[idx]).clone(),
        }
    }

    fn write(&mut self, place: Place, base: usize, value: Value) {
        match place {
            Place::Var(var) => self.ctx.scratch.stack[Self::slot(var, base)] = value,
            Place::Field(idx) => self.ctx.state.write(self.ctx.fields[idx], value),
        }
    }

    fn exec_block(&mut self, ops: &[Op], base: usize) -> Result<Flow, RuntimeFault> {
        for op in ops {
            match self.exec(op, base)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, op: &Op, base: usize) -> Result<Flow, RuntimeFault> {
        self.tick()?;
        match op {
            Op::Assign { place, op, value } => {
                let result = match op {
                    Some(op) => {
                        let current = self.read(*place, base);
                        let rhs = self.eval(value, base)?;
                        value::binary(*op, &current, &rhs)
                    }
                    None => self.eval(value, base)?,
                };
                self.write(*place, base, result);
            }
            Op::Eval(node) => {
                self.eval(node, base)?;
            }
            Op::Return(node) => {
                let value = match node {
                    Some(node) => self.eval(node, base)?,
                    None => Value::Undefined,
                };
                return Ok(Flow::Return(value));
            }
            Op::If { cond, then, otherwise } => {
                let branch = if self.eval(cond, base)?.truthy() { then } else { otherwise };
                return self.exec_block(branch, base);
            }
            Op::Loop { cond, body, update } => loop {
                if let Some(cond) = cond {
                    if !self.eval(cond, base)?.truthy() {
                        break;
                    }
                }
                match self.exec_block(body, base)? {
                    Flow::Break => break,
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Next | Flow::Continue => {}
                }
                self.exec_block(update, base)?;
                self.tick()?;
            },
            Op::ForKeys { var, body } => {
                for i in 0..self.ctx.notes.len() {
                    let key = self.ctx.notes.values()[i].clone();
                    self.write(Place::Var(*var), base, key);
                    match self.exec_block(body, base)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Next | Flow::Continue => {}
                    }
                    self.tick()?;
                }
            }
            Op::Break => return Ok(Flow::Break),
            Op::Continue => return Ok(Flow::Continue),
            Op::Throw(node) => {
                let thrown = self.eval(node, base)?;
                return Err(RuntimeFault::thrown(thrown.to_string()));
            }
        }
        Ok(Flow::Next)
    }

    fn call(&mut self, idx: usize, args: &[Node], base: usize) -> Result<Value, RuntimeFault> {
        let program = self.program;
        let routine: &Routine = &program.routines[idx];
        if self.ctx.scratch.depth >= self.ctx.scratch.max_depth {
            return Err(RuntimeFault {
                kind: FaultKind::CallDepth,
                message: "Maximum call stack size exceeded".into(),
            });
        }

        let frame = self.ctx.scratch.stack.len();
        for (i, arg) in args.iter().enumerate() {
            let value = self.eval(arg, base)?;
            if i < routine.params {
                self.ctx.scratch.stack.push(value);
            }
        }
        self.ctx.scratch.stack.resize(frame + routine.locals, Value::Undefined);

        self.ctx.scratch.depth += 1;
        let flow = self.exec_block(&routine.body, frame);
        self.ctx.scratch.depth -= 1;
        self.ctx.scratch.stack.truncate(frame);

        match flow? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn number(&mut self, args: &[Node], i: usize, base: usize) -> Result<f64, RuntimeFault> {
        match args.get(i) {
            Some(node) => Ok(self.eval(node, base)?.to_number()),
            None => Ok(f64::NAN),
        }
    }

    fn math(&mut self, f: MathFn, args: &[Node], base: usize) -> Result<f64, RuntimeFault> {
        let result = match f {
            MathFn::Min | MathFn::Max | MathFn::Hypot => {
                let mut acc = match f {
                    MathFn::Min => f64::INFINITY,
                    MathFn::Max => f64::NEG_INFINITY,
                    _ => 0.0,
                };
                let mut nan = false;
                for node in args {
                    let n = self.eval(node, base)?.to_number();
                    nan |= n.is_nan();
                    acc = match f {
                        MathFn::Min => acc.min(n),
                        MathFn::Max => acc.max(n),
                        _ => acc.hypot(n),
                    };
                }
                if nan { f64::NAN } else { acc }
            }
            MathFn::Atan2 => {
                let y = self.number(args, 0, base)?;
                y.atan2(self.number(args, 1, base)?)
            }
            MathFn::Pow => {
                let x = self.number(args, 0, base)?;
                x.powf(self.number(args, 1, base)?)
            }
            unary => {
                let x = self.number(args, 0, base)?;
                // Extra arguments are evaluated and ignored.
                for node in args.iter().skip(1) {
                    self.eval(node, base)?;
                }
                apply_unary_math(unary, x)
            }
        };
        Ok(result)
    }

    fn eval(&mut self, node: &Node, base: usize) -> Result<Value, RuntimeFault> {
        let value = match node {
            Node::Const(v) => v.clone(),
            Node::Var(var) => self.ctx.scratch.stack[Self::slot(*var, base)].clone(),
            Node::Field(idx) => self.ctx.state.read(self.ctx.fields[*idx]).clone(),
            Node::Knob(idx) => Value::Number(self.ctx.knobs.value(self.ctx.knob_slots[*idx])),
            Node::KeyCount => Value::Number(self.ctx.notes.len() as f64),
            Node::Key(index) => {
                let index = self.eval(index, base)?.to_number();
                self.ctx.notes.value(index)
            }
            Node::KeysIncludes(needle) => {
                let needle = self.eval(needle, base)?;
                Value::Bool(self.ctx.notes.includes(&needle))
            }
            Node::SampleRate => Value::Number(self.ctx.clock.sample_rate),
            Node::CurrentFrame => Value::Number(self.ctx.clock.frame as f64),
            Node::CurrentTime => Value::Number(self.ctx.clock.time()),
            Node::Unary(op, operand) => value::unary(*op, &self.eval(operand, base)?),
            Node::Binary(op, left, right) => {
                let left = self.eval(left, base)?;
                let right = self.eval(right, base)?;
                value::binary(*op, &left, &right)
            }
            Node::Logical(op, left, right) => {
                let left = self.eval(left, base)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, true) | (LogicalOp::Or, false) => self.eval(right, base)?,
                    _ => left,
                }
            }
            Node::Conditional(cond, then, otherwise) => {
                if self.eval(cond, base)?.truthy() {
                    self.eval(then, base)?
                } else {
                    self.eval(otherwise, base)?
                }
            }
            Node::Math(f, args) => Value::Number(self.math(*f, args, base)?),
            Node::Random => Value::Number(self.ctx.scratch.rng.f64()),
            Node::Mtof(note) => Value::Number(notes::mtof(&self.eval(note, base)?)),
            Node::Call(idx, args) => self.call(*idx, args, base)?,
            Node::ErrorObject(class, message) => {
                let message = match message {
                    Some(node) => self.eval(node, base)?,
                    None => Value::Undefined,
                };
                match message {
                    Value::Undefined => Value::str(class),
                    message => Value::str(&format!("{class}: {message}")),
                }
            }
        };
        Ok(value)
    }
}

fn apply_unary_math(f: MathFn, x: f64) -> f64 {
    match f {
        MathFn::Sin => x.sin(),
        MathFn::Cos => x.cos(),
        MathFn::Tan => x.tan(),
        MathFn::Asin => x.asin(),
        MathFn::Acos => x.acos(),
        MathFn::Atan => x.atan(),
        MathFn::Sinh => x.sinh(),
        MathFn::Cosh => x.cosh(),
        MathFn::Tanh => x.tanh(),
        MathFn::Exp => x.exp(),
        MathFn::Log => x.ln(),
        MathFn::Log2 => x.log2(),
        MathFn::Log10 => x.log10(),
        MathFn::Sqrt => x.sqrt(),
        MathFn::Cbrt => x.cbrt(),
        MathFn::Abs => x.abs(),
        MathFn::Floor => x.floor(),
        MathFn::Ceil => x.ceil(),
        // Halves round toward +Infinity.
        MathFn::Round => {
            let floor = x.floor();
            if x - floor >= 0.5 { floor + 1.0 } else { floor }
        }
        MathFn::Trunc => x.trunc(),
        MathFn::Sign if x == 0.0 || x.is_nan() => x,
        MathFn::Sign => x.signum(),
        MathFn::Min | MathFn::Max | MathFn::Hypot | MathFn::Atan2 | MathFn::Pow => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::knobs::KnobRegistry;
    use crate::dsp::notes::{ActiveNotes, NoteId};
    use crate::dsp::state::StateStore;
    use crate::loader::{load, Clock};

    fn run_with(source: &str, config: &EngineConfig, notes: &ActiveNotes) -> Result<Value, RuntimeFault> {
        let func = load(source).unwrap_or_else(|e| panic!("compile failed: {e}"));
        let mut state = StateStore::new();
        let mut knobs = KnobRegistry::default();
        let fields = state.bind(func.fields());
        let knob_slots = knobs.bind(func.required_knobs());
        let mut scratch = Scratch::new(config);
        let mut ctx = CallContext {
            state: &mut state,
            fields: &fields,
            knobs: &knobs,
            knob_slots: &knob_slots,
            notes,
            clock: Clock { sample_rate: 44100.0, frame: 441 },
            scratch: &mut scratch,
        };
        func.evaluate(&mut ctx)
    }

    fn run(source: &str) -> Result<Value, RuntimeFault> {
        run_with(source, &EngineConfig::default(), &ActiveNotes::new())
    }

    fn num(source: &str) -> f64 {
        run(source).unwrap().to_number()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(num("return 1 + 2 * 3 ** 2"), 19.0);
        assert_eq!(num("return (1 + 2) * 3"), 9.0);
        assert_eq!(num("return 2 ** 3 ** 2"), 512.0);
        assert_eq!(num("return -7 % 3"), -1.0);
    }

    #[test]
    fn bytebeat_expression() {
        assert_eq!(num("const t = 10000\nreturn (t >> 12 | t >> 8) & 63"), f64::from((10000 >> 12 | 10000 >> 8) & 63));
    }

    #[test]
    fn loops_and_locals() {
        let source = r#"
let sum = 0
for (let i = 1; i <= 10; i++) {
  if (i % 2 == 0) continue
  sum += i
}
let n = 0
while (true) {
  n++
  if (n >= 5) break
}
return sum * 100 + n
"#;
        assert_eq!(num(source), 2505.0);
    }

    #[test]
    fn recursion_and_globals() {
        let source = r#"
const scale = 2
function fib(n) {
  if (n < 2) return n
  return fib(n - 1) + fib(n - 2)
}
return fib(10) * scale
"#;
        assert_eq!(num(source), 110.0);
    }

    #[test]
    fn missing_arguments_are_undefined() {
        assert!(num("function f(a, b) { return a + b }\nreturn f(1)").is_nan());
        assert_eq!(num("function f(a) { return a }\nreturn f(3, 4)"), 3.0);
    }

    #[test]
    fn throw_faults_with_message() {
        let fault = run("throw new Error('bad knob')").unwrap_err();
        assert_eq!(fault.kind, FaultKind::Thrown);
        assert_eq!(fault.to_string(), "Uncaught Error: bad knob");
    }

    #[test]
    fn infinite_loop_hits_step_budget() {
        let config = EngineConfig { max_steps_per_sample: 1000, ..Default::default() };
        let fault = run_with("while (true) {}", &config, &ActiveNotes::new()).unwrap_err();
        assert_eq!(fault.kind, FaultKind::StepBudget);
    }

    #[test]
    fn runaway_recursion_hits_call_depth() {
        let fault = run("function f(n) { return f(n + 1) }\nreturn f(0)").unwrap_err();
        assert_eq!(fault.kind, FaultKind::CallDepth);
        assert_eq!(fault.to_string(), "RangeError: Maximum call stack size exceeded");
    }

    #[test]
    fn keys_bindings() {
        let mut notes = ActiveNotes::new();
        notes.set(NoteId::Number(69), true);
        notes.set(NoteId::Number(81), true);
        let source = r#"
let total = 0
for (const k of keys) total += mtof(k)
return total + keys.length * 1000 + (keys.includes(81) ? 1 : 0) + keys[5]
"#;
        let value = run_with(source, &EngineConfig::default(), &notes).unwrap();
        // keys[5] is undefined, so the sum is NaN.
        assert!(value.to_number().is_nan());

        let source = "let total = 0\nfor (const k of keys) total += mtof(k)\nreturn total + (keys.includes(81) ? 1 : 0)";
        let value = run_with(source, &EngineConfig::default(), &notes).unwrap();
        assert!((value.to_number() - 1321.0).abs() < 1e-9);
    }

    #[test]
    fn worklet_globals() {
        assert_eq!(num("return sampleRate"), 44100.0);
        assert_eq!(num("return currentFrame"), 441.0);
        assert!((num("return currentTime") - 0.01).abs() < 1e-12);
    }

    #[test]
    fn seeded_random_is_deterministic() {
        let config = EngineConfig { random_seed: Some(7), ..Default::default() };
        let a = run_with("return Math.random()", &config, &ActiveNotes::new()).unwrap();
        let b = run_with("return Math.random()", &config, &ActiveNotes::new()).unwrap();
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a.to_number()));
    }

    #[test]
    fn math_functions() {
        assert_eq!(num("return Math.max(1, 5, 3)"), 5.0);
        assert_eq!(num("return Math.min()"), f64::INFINITY);
        assert!(num("return Math.max(1, NaN)").is_nan());
        assert_eq!(num("return Math.round(-2.5)"), -2.0);
        assert_eq!(num("return Math.round(2.5)"), 3.0);
        assert_eq!(num("return Math.round(0.49999999999999994)"), 0.0);
        assert_eq!(num("return Math.round(-0.6)"), -1.0);
        assert_eq!(num("return Math.hypot(3, 4)"), 5.0);
        assert_eq!(num("return Math.sign(-3)"), -1.0);
        assert_eq!(num("return Math.floor(Math.PI)"), 3.0);
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(num("function boom() { throw 1 }\nreturn 0 && boom()"), 0.0);
        assert_eq!(num("return 0 || 7"), 7.0);
        assert_eq!(run("return '' || 'fallback'").unwrap(), Value::str("fallback"));
    }

    #[test]
    fn var_redeclaration_keeps_value() {
        assert_eq!(num("var a = 3\nvar a\nreturn a"), 3.0);
    }

    #[test]
    fn no_return_yields_undefined() {
        assert_eq!(run("this.x = 1").unwrap(), Value::Undefined);
    }
}
