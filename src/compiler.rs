use std::collections::HashMap;

use crate::ast::*;
use crate::error::ResolveError;
use crate::token::Span;
use crate::value::{self, Value};

// ── Compiled Program (Compiler Output) ──────────────────────

/// A resolved snippet: every name is a slot, every knob and field is indexed.
///
/// `fields` and `knobs` list the persistent field names and knob names the
/// snippet references, in order of first appearance. Engines bind these to
/// their own slots when the program is activated.
#[derive(Debug, Clone)]
pub struct Program {
    pub main: Routine,
    pub routines: Vec<Routine>,
    pub fields: Vec<String>,
    pub knobs: Vec<String>,
}

/// The snippet body or one top-level `function` declaration.
#[derive(Debug, Clone, Default)]
pub struct Routine {
    pub name: String,
    pub params: usize,
    /// Frame size, parameters included.
    pub locals: usize,
    pub body: Vec<Op>,
}

/// Variable slot. `Global` addresses the snippet body's frame from inside a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    Local(usize),
    Global(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Place {
    Var(Var),
    Field(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Log2,
    Log10,
    Pow,
    Sqrt,
    Cbrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Trunc,
    Sign,
    Min,
    Max,
    Hypot,
}

#[derive(Debug, Clone)]
pub enum Node {
    Const(Value),
    Var(Var),
    Field(usize),
    Knob(usize),
    /// `keys.length`
    KeyCount,
    /// `keys[i]`
    Key(Box<Node>),
    /// `keys.includes(x)`
    KeysIncludes(Box<Node>),
    SampleRate,
    CurrentFrame,
    CurrentTime,
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Logical(LogicalOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
    Math(MathFn, Vec<Node>),
    Random,
    /// MIDI note number or note name → frequency in Hz.
    Mtof(Box<Node>),
    Call(usize, Vec<Node>),
    /// `new Error(msg)`, rendered as `"Error: msg"`.
    ErrorObject(&'static str, Option<Box<Node>>),
}

#[derive(Debug, Clone)]
pub enum Op {
    Assign { place: Place, op: Option<BinaryOp>, value: Node },
    Eval(Node),
    Return(Option<Node>),
    If { cond: Node, then: Vec<Op>, otherwise: Vec<Op> },
    Loop { cond: Option<Node>, body: Vec<Op>, update: Vec<Op> },
    /// `for (const k of keys)`
    ForKeys { var: Var, body: Vec<Op> },
    Break,
    Continue,
    Throw(Node),
}

// ── Resolution Context ──────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Binding {
    slot: usize,
    constant: bool,
}

/// Per-routine compile state.
struct FrameCtx {
    /// Block scopes; the snippet body's outermost scope lives in `Compiler::globals`.
    scopes: Vec<HashMap<String, Binding>>,
    next_local: usize,
    loop_depth: usize,
    is_main: bool,
}

impl FrameCtx {
    fn declare(&mut self, name: &str, constant: bool, span: Span) -> Result<usize, ResolveError> {
        if self.current(name).is_some() {
            return Err(ResolveError::Redeclared { name: name.into(), span });
        }
        let slot = self.next_local;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), Binding { slot, constant });
        }
        self.next_local += 1;
        Ok(slot)
    }

    /// Binding declared in the innermost scope only.
    fn current(&self, name: &str) -> Option<Binding> {
        self.scopes.last().and_then(|scope| scope.get(name).copied())
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    /// True while compiling statements directly in the snippet body.
    fn at_top_level(&self) -> bool {
        self.is_main && self.scopes.len() == 1
    }
}

struct Compiler<'a> {
    knobs_param: Option<&'a str>,
    keys_param: Option<&'a str>,
    /// Top-level function name → routine index.
    functions: HashMap<String, usize>,
    routines: Vec<Option<Routine>>,
    /// Top-level declarations of the snippet body, visible to every routine.
    globals: HashMap<String, Binding>,
    fields: Vec<String>,
    field_index: HashMap<String, usize>,
    knobs: Vec<String>,
    knob_index: HashMap<String, usize>,
}

/// Compile a parsed snippet into a resolved `Program`.
pub fn compile(snippet: &Snippet) -> Result<Program, ResolveError> {
    let mut compiler = Compiler {
        knobs_param: snippet.knobs_param.as_deref(),
        keys_param: snippet.keys_param.as_deref(),
        functions: HashMap::new(),
        routines: Vec::new(),
        globals: HashMap::new(),
        fields: Vec::new(),
        field_index: HashMap::new(),
        knobs: Vec::new(),
        knob_index: HashMap::new(),
    };
    compiler.hoist(&snippet.body)?;

    let mut frame = FrameCtx {
        scopes: vec![HashMap::new()],
        next_local: compiler.globals.len(),
        loop_depth: 0,
        is_main: true,
    };
    let body = compiler.compile_block(&mut frame, &snippet.body)?;
    let main = Routine {
        name: "main".into(),
        params: 0,
        locals: frame.next_local,
        body,
    };

    let routines = compiler.routines.into_iter().map(Option::unwrap_or_default).collect();
    Ok(Program {
        main,
        routines,
        fields: compiler.fields,
        knobs: compiler.knobs,
    })
}

impl<'a> Compiler<'a> {
    /// Register top-level functions and top-level variables before compiling bodies,
    /// so functions may call each other and read variables declared anywhere at top level.
    fn hoist(&mut self, body: &[Stmt]) -> Result<(), ResolveError> {
        let reserved = [self.knobs_param, self.keys_param];
        for stmt in body {
            match &stmt.kind {
                StmtKind::Function(decl) => {
                    if self.functions.contains_key(&decl.name) || reserved.contains(&Some(decl.name.as_str())) {
                        return Err(ResolveError::Redeclared { name: decl.name.clone(), span: stmt.span });
                    }
                    self.functions.insert(decl.name.clone(), self.routines.len());
                    self.routines.push(None);
                }
                StmtKind::Declare { kind, declarations } => {
                    for decl in declarations {
                        if reserved.contains(&Some(decl.name.as_str())) {
                            return Err(ResolveError::Redeclared { name: decl.name.clone(), span: decl.span });
                        }
                        match self.globals.get(&decl.name) {
                            Some(_) if *kind == DeclKind::Var => {}
                            Some(_) => {
                                return Err(ResolveError::Redeclared {
                                    name: decl.name.clone(),
                                    span: decl.span,
                                });
                            }
                            None => {
                                let slot = self.globals.len();
                                let constant = *kind == DeclKind::Const;
                                self.globals.insert(decl.name.clone(), Binding { slot, constant });
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if let Some(name) = self.globals.keys().find(|name| self.functions.contains_key(*name)) {
            return Err(ResolveError::Redeclared { name: name.clone(), span: Span::default() });
        }
        Ok(())
    }

    fn compile_routine(&mut self, decl: &FunctionDecl) -> Result<Routine, ResolveError> {
        let mut params = HashMap::new();
        for (slot, name) in decl.params.iter().enumerate() {
            params.insert(name.clone(), Binding { slot, constant: false });
        }
        let mut frame = FrameCtx {
            scopes: vec![params],
            next_local: decl.params.len(),
            loop_depth: 0,
            is_main: false,
        };
        let body = self.compile_block(&mut frame, &decl.body)?;
        Ok(Routine {
            name: decl.name.clone(),
            params: decl.params.len(),
            locals: frame.next_local,
            body,
        })
    }

    fn intern_field(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.field_index.get(name) {
            return idx;
        }
        let idx = self.fields.len();
        self.fields.push(name.to_string());
        self.field_index.insert(name.to_string(), idx);
        idx
    }

    fn intern_knob(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.knob_index.get(name) {
            return idx;
        }
        let idx = self.knobs.len();
        self.knobs.push(name.to_string());
        self.knob_index.insert(name.to_string(), idx);
        idx
    }

    // ── Statements ──────────────────────────────────────────

    fn compile_block(&mut self, frame: &mut FrameCtx, stmts: &[Stmt]) -> Result<Vec<Op>, ResolveError> {
        let mut ops = Vec::new();
        for stmt in stmts {
            self.compile_stmt(frame, stmt, &mut ops)?;
        }
        Ok(ops)
    }

    /// Compile `stmt` in a fresh block scope.
    fn compile_scoped(&mut self, frame: &mut FrameCtx, stmt: &Stmt) -> Result<Vec<Op>, ResolveError> {
        frame.scopes.push(HashMap::new());
        let mut ops = Vec::new();
        let result = self.compile_stmt(frame, stmt, &mut ops);
        frame.scopes.pop();
        result.map(|()| ops)
    }

    fn compile_loop_body(&mut self, frame: &mut FrameCtx, body: &Stmt) -> Result<Vec<Op>, ResolveError> {
        frame.loop_depth += 1;
        let ops = self.compile_scoped(frame, body);
        frame.loop_depth -= 1;
        ops
    }

    fn compile_stmt(&mut self, frame: &mut FrameCtx, stmt: &Stmt, ops: &mut Vec<Op>) -> Result<(), ResolveError> {
        match &stmt.kind {
            StmtKind::Declare { kind, declarations } => {
                for decl in declarations {
                    let init = decl.init.as_ref().map(|e| self.compile_expr(frame, e)).transpose()?;
                    let redeclared_var = match kind {
                        DeclKind::Var => frame.current(&decl.name),
                        _ => None,
                    };
                    let slot = if frame.at_top_level() {
                        self.globals[&decl.name].slot
                    } else if let Some(binding) = redeclared_var {
                        binding.slot
                    } else {
                        frame.declare(&decl.name, *kind == DeclKind::Const, decl.span)?
                    };
                    let value = match init {
                        Some(node) => node,
                        // A redeclared `var` keeps its value.
                        None if *kind == DeclKind::Var => continue,
                        None => Node::Const(Value::Undefined),
                    };
                    ops.push(Op::Assign { place: Place::Var(Var::Local(slot)), op: None, value });
                }
            }
            StmtKind::Function(decl) => {
                if !frame.at_top_level() {
                    return Err(ResolveError::NestedFunction { name: decl.name.clone(), span: stmt.span });
                }
                let idx = self.functions[&decl.name];
                let routine = self.compile_routine(decl)?;
                self.routines[idx] = Some(routine);
            }
            StmtKind::Assign { target, op, value } => {
                let place = self.resolve_place(frame, target)?;
                let value = self.compile_expr(frame, value)?;
                ops.push(Op::Assign { place, op: *op, value });
            }
            StmtKind::Update { target, increment } => {
                let place = self.resolve_place(frame, target)?;
                let op = if *increment { BinaryOp::Add } else { BinaryOp::Sub };
                ops.push(Op::Assign { place, op: Some(op), value: Node::Const(Value::Number(1.0)) });
            }
            StmtKind::Expr(expr) => ops.push(Op::Eval(self.compile_expr(frame, expr)?)),
            StmtKind::Return(value) => {
                let value = value.as_ref().map(|e| self.compile_expr(frame, e)).transpose()?;
                ops.push(Op::Return(value));
            }
            StmtKind::If { cond, then, otherwise } => {
                let cond = self.compile_expr(frame, cond)?;
                let then = self.compile_scoped(frame, then)?;
                let otherwise = match otherwise {
                    Some(stmt) => self.compile_scoped(frame, stmt)?,
                    None => Vec::new(),
                };
                ops.push(Op::If { cond, then, otherwise });
            }
            StmtKind::For { init, cond, update, body } => {
                frame.scopes.push(HashMap::new());
                let result = self.compile_for(frame, init.as_deref(), cond.as_ref(), update.as_deref(), body, ops);
                frame.scopes.pop();
                result?;
            }
            StmtKind::ForOf { kind, name, iterable, body } => {
                if !self.is_keys(frame, iterable) {
                    return Err(ResolveError::InvalidUse {
                        name: format!("for...of over {}", iterable.as_ident().unwrap_or("expression")),
                        span: iterable.span,
                    });
                }
                frame.scopes.push(HashMap::new());
                let result = self.compile_for_of(frame, *kind, name, body, stmt.span);
                frame.scopes.pop();
                ops.push(result?);
            }
            StmtKind::While { cond, body } => {
                let cond = self.compile_expr(frame, cond)?;
                let body = self.compile_loop_body(frame, body)?;
                ops.push(Op::Loop { cond: Some(cond), body, update: Vec::new() });
            }
            StmtKind::Block(stmts) => {
                frame.scopes.push(HashMap::new());
                let result = stmts.iter().try_for_each(|s| self.compile_stmt(frame, s, ops));
                frame.scopes.pop();
                result?;
            }
            StmtKind::Break | StmtKind::Continue => {
                let (keyword, op) = match stmt.kind {
                    StmtKind::Break => ("break", Op::Break),
                    _ => ("continue", Op::Continue),
                };
                if frame.loop_depth == 0 {
                    return Err(ResolveError::OutsideLoop { keyword, span: stmt.span });
                }
                ops.push(op);
            }
            StmtKind::Throw(value) => ops.push(Op::Throw(self.compile_expr(frame, value)?)),
            StmtKind::Empty => {}
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        frame: &mut FrameCtx,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: Option<&Stmt>,
        body: &Stmt,
        ops: &mut Vec<Op>,
    ) -> Result<(), ResolveError> {
        if let Some(init) = init {
            self.compile_stmt(frame, init, ops)?;
        }
        let cond = cond.map(|c| self.compile_expr(frame, c)).transpose()?;
        let mut update_ops = Vec::new();
        if let Some(update) = update {
            self.compile_stmt(frame, update, &mut update_ops)?;
        }
        let body = self.compile_loop_body(frame, body)?;
        ops.push(Op::Loop { cond, body, update: update_ops });
        Ok(())
    }

    fn compile_for_of(
        &mut self,
        frame: &mut FrameCtx,
        kind: DeclKind,
        name: &str,
        body: &Stmt,
        span: Span,
    ) -> Result<Op, ResolveError> {
        let slot = frame.declare(name, kind == DeclKind::Const, span)?;
        let body = self.compile_loop_body(frame, body)?;
        Ok(Op::ForKeys { var: Var::Local(slot), body })
    }

    // ── Names ───────────────────────────────────────────────

    fn lookup_var(&self, frame: &FrameCtx, name: &str) -> Option<(Var, bool)> {
        if let Some(binding) = frame.lookup(name) {
            return Some((Var::Local(binding.slot), binding.constant));
        }
        let binding = self.globals.get(name)?;
        let var = if frame.is_main { Var::Local(binding.slot) } else { Var::Global(binding.slot) };
        Some((var, binding.constant))
    }

    /// True if `name` refers to the knob object rather than a shadowing variable.
    fn names_knobs(&self, frame: &FrameCtx, name: &str) -> bool {
        self.knobs_param == Some(name) && self.lookup_var(frame, name).is_none()
    }

    fn names_keys(&self, frame: &FrameCtx, name: &str) -> bool {
        self.keys_param == Some(name) && self.lookup_var(frame, name).is_none()
    }

    fn names_builtin(&self, frame: &FrameCtx, name: &str, builtin: &str) -> bool {
        name == builtin
            && self.lookup_var(frame, name).is_none()
            && !self.functions.contains_key(name)
            && self.knobs_param != Some(name)
            && self.keys_param != Some(name)
    }

    fn is_keys(&self, frame: &FrameCtx, expr: &Expr) -> bool {
        expr.as_ident().is_some_and(|name| self.names_keys(frame, name))
    }

    fn resolve_place(&mut self, frame: &FrameCtx, target: &Expr) -> Result<Place, ResolveError> {
        match &target.kind {
            ExprKind::Ident(name) => match self.lookup_var(frame, name) {
                Some((_, true)) => Err(ResolveError::AssignToConstant { name: name.clone(), span: target.span }),
                Some((var, false)) => Ok(Place::Var(var)),
                None if self.knobs_param == Some(name.as_str())
                    || self.keys_param == Some(name.as_str())
                    || self.functions.contains_key(name)
                    || is_builtin_name(name) =>
                {
                    Err(ResolveError::ReadOnly { name: name.clone(), span: target.span })
                }
                None => Err(ResolveError::UnknownIdentifier { name: name.clone(), span: target.span }),
            },
            ExprKind::Member { object, property } => match &object.kind {
                ExprKind::This => Ok(Place::Field(self.intern_field(property))),
                ExprKind::Ident(name) => Err(ResolveError::ReadOnly {
                    name: format!("{name}.{property}"),
                    span: target.span,
                }),
                _ => Err(ResolveError::InvalidUse { name: "expression".into(), span: target.span }),
            },
            ExprKind::Index { object, index } => match (&object.kind, &index.kind) {
                (ExprKind::This, ExprKind::Str(name)) => Ok(Place::Field(self.intern_field(name))),
                (ExprKind::This, _) => Err(ResolveError::DynamicName { object: "this".into(), span: index.span }),
                (ExprKind::Ident(name), _) => Err(ResolveError::ReadOnly { name: name.clone(), span: target.span }),
                _ => Err(ResolveError::InvalidUse { name: "expression".into(), span: target.span }),
            },
            _ => Err(ResolveError::InvalidUse { name: "expression".into(), span: target.span }),
        }
    }

    // ── Expressions ─────────────────────────────────────────

    fn compile_exprs(&mut self, frame: &FrameCtx, exprs: &[Expr]) -> Result<Vec<Node>, ResolveError> {
        exprs.iter().map(|e| self.compile_expr(frame, e)).collect()
    }

    fn compile_expr(&mut self, frame: &FrameCtx, expr: &Expr) -> Result<Node, ResolveError> {
        let node = match &expr.kind {
            ExprKind::Number(n) => Node::Const(Value::Number(*n)),
            ExprKind::Str(s) => Node::Const(Value::str(s)),
            ExprKind::Bool(b) => Node::Const(Value::Bool(*b)),
            ExprKind::Null => Node::Const(Value::Undefined),
            ExprKind::Ident(name) => self.compile_ident(frame, name, expr.span)?,
            ExprKind::This => {
                return Err(ResolveError::InvalidUse { name: "this".into(), span: expr.span });
            }
            ExprKind::Member { object, property } => self.compile_member(frame, object, property, expr.span)?,
            ExprKind::Index { object, index } => self.compile_index(frame, object, index, expr.span)?,
            ExprKind::Call { callee, args } => self.compile_call(frame, callee, args, expr.span)?,
            ExprKind::New { class, args } => {
                let class: &'static str = match class.as_str() {
                    "Error" => "Error",
                    "RangeError" => "RangeError",
                    "TypeError" => "TypeError",
                    _ => {
                        return Err(ResolveError::UnknownIdentifier { name: class.clone(), span: expr.span });
                    }
                };
                let mut args = self.compile_exprs(frame, args)?.into_iter();
                Node::ErrorObject(class, args.next().map(Box::new))
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.compile_expr(frame, operand)?;
                match operand {
                    Node::Const(ref v) => Node::Const(value::unary(*op, v)),
                    operand => Node::Unary(*op, Box::new(operand)),
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.compile_expr(frame, left)?;
                let right = self.compile_expr(frame, right)?;
                match (left, right) {
                    (Node::Const(a), Node::Const(b)) => Node::Const(value::binary(*op, &a, &b)),
                    (left, right) => Node::Binary(*op, Box::new(left), Box::new(right)),
                }
            }
            ExprKind::Logical { op, left, right } => Node::Logical(
                *op,
                Box::new(self.compile_expr(frame, left)?),
                Box::new(self.compile_expr(frame, right)?),
            ),
            ExprKind::Conditional { cond, then, otherwise } => Node::Conditional(
                Box::new(self.compile_expr(frame, cond)?),
                Box::new(self.compile_expr(frame, then)?),
                Box::new(self.compile_expr(frame, otherwise)?),
            ),
        };
        Ok(node)
    }

    fn compile_ident(&mut self, frame: &FrameCtx, name: &str, span: Span) -> Result<Node, ResolveError> {
        if let Some((var, _)) = self.lookup_var(frame, name) {
            return Ok(Node::Var(var));
        }
        if self.functions.contains_key(name)
            || self.knobs_param == Some(name)
            || self.keys_param == Some(name)
        {
            return Err(ResolveError::InvalidUse { name: name.into(), span });
        }
        let node = match name {
            "undefined" => Node::Const(Value::Undefined),
            "NaN" => Node::Const(Value::Number(f64::NAN)),
            "Infinity" => Node::Const(Value::Number(f64::INFINITY)),
            "sampleRate" => Node::SampleRate,
            "currentFrame" => Node::CurrentFrame,
            "currentTime" => Node::CurrentTime,
            "Math" | "mtof" => return Err(ResolveError::InvalidUse { name: name.into(), span }),
            _ => return Err(ResolveError::UnknownIdentifier { name: name.into(), span }),
        };
        Ok(node)
    }

    fn compile_member(&mut self, frame: &FrameCtx, object: &Expr, property: &str, span: Span) -> Result<Node, ResolveError> {
        if matches!(object.kind, ExprKind::This) {
            return Ok(Node::Field(self.intern_field(property)));
        }
        let unknown = || ResolveError::UnknownMember {
            object: object.as_ident().unwrap_or("expression").into(),
            property: property.into(),
            span,
        };
        let Some(name) = object.as_ident() else {
            return Err(unknown());
        };
        if self.names_knobs(frame, name) {
            return Ok(Node::Knob(self.intern_knob(property)));
        }
        if self.names_keys(frame, name) {
            return match property {
                "length" => Ok(Node::KeyCount),
                _ => Err(unknown()),
            };
        }
        if self.names_builtin(frame, name, "Math") {
            let constant = match property {
                "PI" => std::f64::consts::PI,
                "E" => std::f64::consts::E,
                "LN2" => std::f64::consts::LN_2,
                "LN10" => std::f64::consts::LN_10,
                "LOG2E" => std::f64::consts::LOG2_E,
                "LOG10E" => std::f64::consts::LOG10_E,
                "SQRT2" => std::f64::consts::SQRT_2,
                "SQRT1_2" => std::f64::consts::FRAC_1_SQRT_2,
                _ if math_fn(property).is_some() || property == "random" => {
                    return Err(ResolveError::InvalidUse { name: format!("Math.{property}"), span });
                }
                _ => return Err(unknown()),
            };
            return Ok(Node::Const(Value::Number(constant)));
        }
        // Any other identifier resolves (or fails) as a plain value first.
        self.compile_ident(frame, name, object.span)?;
        Err(unknown())
    }

    fn compile_index(&mut self, frame: &FrameCtx, object: &Expr, index: &Expr, span: Span) -> Result<Node, ResolveError> {
        match (&object.kind, &index.kind) {
            (ExprKind::This, ExprKind::Str(name)) => return Ok(Node::Field(self.intern_field(name))),
            (ExprKind::This, _) => {
                return Err(ResolveError::DynamicName { object: "this".into(), span: index.span });
            }
            _ => {}
        }
        let Some(name) = object.as_ident() else {
            return Err(ResolveError::InvalidUse { name: "indexed expression".into(), span });
        };
        if self.names_knobs(frame, name) {
            return match &index.kind {
                ExprKind::Str(knob) => Ok(Node::Knob(self.intern_knob(knob))),
                _ => Err(ResolveError::DynamicName { object: name.into(), span: index.span }),
            };
        }
        if self.names_keys(frame, name) {
            return Ok(Node::Key(Box::new(self.compile_expr(frame, index)?)));
        }
        self.compile_ident(frame, name, object.span)?;
        Err(ResolveError::InvalidUse { name: format!("{name}[...]"), span })
    }

    fn compile_call(&mut self, frame: &FrameCtx, callee: &Expr, args: &[Expr], span: Span) -> Result<Node, ResolveError> {
        match &callee.kind {
            ExprKind::Ident(name) => {
                if self.lookup_var(frame, name).is_none() {
                    if let Some(&idx) = self.functions.get(name) {
                        return Ok(Node::Call(idx, self.compile_exprs(frame, args)?));
                    }
                    if self.names_builtin(frame, name, "mtof") {
                        let arg = match args.first() {
                            Some(arg) => self.compile_expr(frame, arg)?,
                            None => Node::Const(Value::Undefined),
                        };
                        return Ok(Node::Mtof(Box::new(arg)));
                    }
                }
                self.compile_ident(frame, name, callee.span)?;
                Err(ResolveError::NotCallable { name: name.clone(), span })
            }
            ExprKind::Member { object, property } => {
                let object_name = object.as_ident().unwrap_or_default();
                if self.names_builtin(frame, object_name, "Math") {
                    if property == "random" {
                        return Ok(Node::Random);
                    }
                    if let Some(f) = math_fn(property) {
                        return Ok(Node::Math(f, self.compile_exprs(frame, args)?));
                    }
                    return Err(ResolveError::UnknownMember {
                        object: "Math".into(),
                        property: property.clone(),
                        span: callee.span,
                    });
                }
                if self.names_keys(frame, object_name) && property == "includes" {
                    let arg = match args.first() {
                        Some(arg) => self.compile_expr(frame, arg)?,
                        None => Node::Const(Value::Undefined),
                    };
                    return Ok(Node::KeysIncludes(Box::new(arg)));
                }
                self.compile_member(frame, object, property, callee.span)?;
                Err(ResolveError::NotCallable { name: format!("{object_name}.{property}"), span })
            }
            _ => Err(ResolveError::NotCallable { name: "expression".into(), span }),
        }
    }
}

fn is_builtin_name(name: &str) -> bool {
    matches!(
        name,
        "Math" | "mtof" | "undefined" | "NaN" | "Infinity" | "sampleRate" | "currentFrame" | "currentTime"
    )
}

fn math_fn(name: &str) -> Option<MathFn> {
    let f = match name {
        "sin" => MathFn::Sin,
        "cos" => MathFn::Cos,
        "tan" => MathFn::Tan,
        "asin" => MathFn::Asin,
        "acos" => MathFn::Acos,
        "atan" => MathFn::Atan,
        "atan2" => MathFn::Atan2,
        "sinh" => MathFn::Sinh,
        "cosh" => MathFn::Cosh,
        "tanh" => MathFn::Tanh,
        "exp" => MathFn::Exp,
        "log" => MathFn::Log,
        "log2" => MathFn::Log2,
        "log10" => MathFn::Log10,
        "pow" => MathFn::Pow,
        "sqrt" => MathFn::Sqrt,
        "cbrt" => MathFn::Cbrt,
        "abs" => MathFn::Abs,
        "floor" => MathFn::Floor,
        "ceil" => MathFn::Ceil,
        "round" => MathFn::Round,
        "trunc" => MathFn::Trunc,
        "sign" => MathFn::Sign,
        "min" => MathFn::Min,
        "max" => MathFn::Max,
        "hypot" => MathFn::Hypot,
        _ => return None,
    };
    Some(f)
}
