//! # Virtual Machine
//!
//! A stack-based bytecode interpreter (§4.3). `run()` is a straight
//! `match` over [`Instr`] variants; there is no dispatch table, since the
//! typed enum already gives the compiler an exhaustiveness check a byte
//! switch can't.
//!
//! Call frames track only what the source's `CallFrame` does: which
//! closure is executing, where its instruction pointer is, and where its
//! stack window starts (`frame_base`). Slot 0 of every frame's window
//! holds the closure value itself (reserved by the compiler's locals
//! array), matching the source's calling convention.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::chunk::{Instr, UpvalueCapture};
use crate::error::RuntimeError;
use crate::object::{Interner, ObjClosure, ObjFunction, ObjString, Upvalue};
use crate::table::Table;
use crate::value::{Obj, Value};

/// Cap on live call frames (§3 invariants, §7 "frame overflow"). Matches
/// the source's `FRAME_MAX`.
const FRAME_MAX: usize = 256;

struct CallFrame {
    closure: Rc<RefCell<ObjClosure>>,
    ip: usize,
    frame_base: usize,
}

/// The VM's mutable execution state. Generic over the `Print` sink so
/// tests can capture output into a buffer instead of real stdout.
pub struct Vm<W: Write> {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table<Value>,
    strings: Interner,
    open_upvalues: Vec<Rc<RefCell<Upvalue>>>,
    output: W,
}

impl Vm<io::Stdout> {
    /// Build a VM that prints to real standard output. `interner` must be
    /// the same one the companion [`crate::compiler::compile`] call used,
    /// so constant-pool strings and strings built at runtime (e.g. by
    /// `+`) intern into the same table and compare equal by pointer.
    pub fn new(interner: Interner) -> Self {
        Vm::with_writer(interner, io::stdout())
    }
}

impl<W: Write> Vm<W> {
    pub fn with_writer(interner: Interner, output: W) -> Self {
        Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            globals: Table::new(),
            strings: interner,
            open_upvalues: Vec::new(),
            output,
        }
    }

    /// Run a compiled program to completion (§4.3, §6). The top-level
    /// function is wrapped in a zero-upvalue closure and called exactly
    /// as a user-declared function would be; returning from it (the
    /// implicit trailing `nil; return` the compiler always emits) halts
    /// the VM.
    pub fn interpret(&mut self, function: Rc<ObjFunction>) -> Result<(), RuntimeError> {
        let closure = Rc::new(RefCell::new(ObjClosure::new(function)));
        self.stack.push(Value::closure(closure.clone()));
        self.frames.push(CallFrame { closure, ip: 0, frame_base: 0 });
        self.run()
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let (instr, line) = {
                let frame = self.frames.last().expect("interpret() always pushes an initial frame");
                let closure = frame.closure.borrow();
                (closure.function.chunk.code[frame.ip].clone(), closure.function.chunk.lines[frame.ip])
            };
            self.frames.last_mut().unwrap().ip += 1;

            match instr {
                Instr::Constant(idx) => {
                    let value = self.read_constant(idx);
                    self.stack.push(value);
                }
                Instr::Nil => self.stack.push(Value::Nil),
                Instr::True => self.stack.push(Value::Bool(true)),
                Instr::False => self.stack.push(Value::Bool(false)),
                Instr::Pop => {
                    self.pop();
                }
                Instr::Negate => {
                    let operand = self.pop();
                    match operand.as_number() {
                        Some(n) => self.stack.push(Value::Number(-n)),
                        None => return Err(self.runtime_error(line, "Operand must be a number.")),
                    }
                }
                Instr::Not => {
                    let operand = self.pop();
                    self.stack.push(Value::Bool(operand.is_falsey()));
                }
                Instr::Add => self.binary_add(line)?,
                Instr::Subtract => self.binary_numeric(line, |a, b| a - b)?,
                Instr::Multiply => self.binary_numeric(line, |a, b| a * b)?,
                Instr::Divide => self.binary_numeric(line, |a, b| a / b)?,
                Instr::Greater => self.binary_compare(line, |a, b| a > b)?,
                Instr::Less => self.binary_compare(line, |a, b| a < b)?,
                Instr::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    match a.equals(&b) {
                        Some(eq) => self.stack.push(Value::Bool(eq)),
                        None => {
                            let message =
                                format!("Cannot compare {} and {}.", a.type_name(), b.type_name());
                            return Err(self.runtime_error(line, &message));
                        }
                    }
                }
                Instr::Print => {
                    let value = self.pop();
                    // A write failure here means the sink (a file, a
                    // pipe) is gone; there is nothing the interpreted
                    // program can do about it, so surface it as a
                    // runtime error rather than panicking.
                    if writeln!(self.output, "{}", value).is_err() {
                        return Err(self.runtime_error(line, "Failed to write program output."));
                    }
                }
                Instr::DefineGlobal(idx) => {
                    let name = self.read_string(idx);
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                Instr::GetGlobal(idx) => {
                    let name = self.read_string(idx);
                    match self.globals.get(&name).cloned() {
                        Some(value) => self.stack.push(value),
                        None => {
                            let message = format!("Undefined variable '{}'.", name.chars);
                            return Err(self.runtime_error(line, &message));
                        }
                    }
                }
                Instr::SetGlobal(idx) => {
                    let name = self.read_string(idx);
                    // Check-then-error without touching the table: an
                    // assignment to an undefined global is a runtime
                    // error and must not have the side effect of
                    // defining it (§9).
                    if !self.globals.contains(&name) {
                        let message = format!("Undefined variable '{}'.", name.chars);
                        return Err(self.runtime_error(line, &message));
                    }
                    let value = self.peek(0).clone();
                    self.globals.set(name, value);
                }
                Instr::GetLocal(slot) => {
                    let base = self.frames.last().unwrap().frame_base;
                    let value = self.stack[base + slot as usize].clone();
                    self.stack.push(value);
                }
                Instr::SetLocal(slot) => {
                    let base = self.frames.last().unwrap().frame_base;
                    let value = self.peek(0).clone();
                    self.stack[base + slot as usize] = value;
                }
                Instr::GetUpvalue(slot) => {
                    let value = self.read_upvalue(slot);
                    self.stack.push(value);
                }
                Instr::SetUpvalue(slot) => {
                    let value = self.peek(0).clone();
                    self.write_upvalue(slot, value);
                }
                Instr::JumpIfFalse(target) => {
                    if self.peek(0).is_falsey() {
                        self.frames.last_mut().unwrap().ip = target;
                    }
                }
                Instr::Jump(target) => {
                    self.frames.last_mut().unwrap().ip = target;
                }
                Instr::Call(argc) => self.call_value(argc, line)?,
                Instr::Closure(idx, captures) => self.make_closure(idx, &captures),
                Instr::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.stack.pop();
                }
                Instr::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("Return always runs inside a frame");
                    self.close_upvalues(frame.frame_base);
                    self.stack.truncate(frame.frame_base);
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.stack.push(result);
                }
            }
        }
    }

    // ---- stack helpers ------------------------------------------------

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow indicates a compiler bug")
    }

    fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    fn runtime_error(&self, line: u32, message: &str) -> RuntimeError {
        RuntimeError::new(line, message.to_string())
    }

    fn read_constant(&self, idx: u8) -> Value {
        let frame = self.frames.last().expect("read_constant runs inside a frame");
        frame.closure.borrow().function.chunk.constants[idx as usize].clone()
    }

    fn read_string(&self, idx: u8) -> Rc<ObjString> {
        self.read_constant(idx)
            .as_string()
            .expect("the compiler only emits string constants for name operands")
            .clone()
    }

    // ---- arithmetic -----------------------------------------------------

    fn binary_add(&mut self, line: u32) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            self.stack.push(Value::Number(x + y));
            return Ok(());
        }
        match (a.as_string(), b.as_string()) {
            (Some(x), Some(y)) => {
                let concatenated = format!("{}{}", x.chars, y.chars);
                let interned = self.strings.intern(&concatenated);
                self.stack.push(Value::string(interned));
                Ok(())
            }
            _ => Err(self.runtime_error(line, "Operands must be two numbers or two strings.")),
        }
    }

    fn binary_numeric(&mut self, line: u32, op: fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.stack.push(Value::Number(op(x, y)));
                Ok(())
            }
            _ => Err(self.runtime_error(line, "Operands must be numbers.")),
        }
    }

    fn binary_compare(&mut self, line: u32, op: fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => {
                self.stack.push(Value::Bool(op(x, y)));
                Ok(())
            }
            _ => Err(self.runtime_error(line, "Operands must be numbers.")),
        }
    }

    // ---- calls ----------------------------------------------------------

    fn call_value(&mut self, argc: u8, line: u32) -> Result<(), RuntimeError> {
        let argc = argc as usize;
        let callee_index = self.stack.len() - argc - 1;
        let callee = self.stack[callee_index].clone();
        let closure = match callee.as_closure() {
            Some(c) => c.clone(),
            None => return Err(self.runtime_error(line, "Can only call functions.")),
        };

        let arity = closure.borrow().function.arity as usize;
        if arity != argc {
            let message = format!("Expected {} arguments but got {}.", arity, argc);
            return Err(self.runtime_error(line, &message));
        }

        if self.frames.len() >= FRAME_MAX {
            return Err(self.runtime_error(line, "Stack overflow."));
        }

        self.frames.push(CallFrame { closure, ip: 0, frame_base: callee_index });
        Ok(())
    }

    // ---- closures and upvalues -------------------------------------------

    fn make_closure(&mut self, idx: u8, captures: &[UpvalueCapture]) {
        let function = match self.read_constant(idx) {
            Value::Obj(Obj::Function(f)) => f,
            _ => unreachable!("Closure operand must reference a function constant"),
        };

        let mut closure = ObjClosure::new(function);
        let frame_base = self.frames.last().unwrap().frame_base;
        for capture in captures {
            let upvalue = if capture.is_local {
                self.capture_upvalue(frame_base + capture.index as usize)
            } else {
                self.frames.last().unwrap().closure.borrow().upvalues[capture.index as usize].clone()
            };
            closure.upvalues.push(upvalue);
        }

        self.stack.push(Value::closure(Rc::new(RefCell::new(closure))));
    }

    /// Find (or create) the open upvalue aliasing stack slot `location`.
    /// `open_upvalues` is kept sorted by descending `location` so
    /// [`Self::close_upvalues`] can stop at the first entry below its
    /// threshold instead of scanning the whole list.
    fn capture_upvalue(&mut self, location: usize) -> Rc<RefCell<Upvalue>> {
        for existing in &self.open_upvalues {
            if let Upvalue::Open(loc) = &*existing.borrow() {
                if *loc == location {
                    return existing.clone();
                }
            }
        }

        let upvalue = Rc::new(RefCell::new(Upvalue::Open(location)));
        let insert_at = self
            .open_upvalues
            .iter()
            .position(|u| match &*u.borrow() {
                Upvalue::Open(loc) => *loc < location,
                Upvalue::Closed(_) => unreachable!("open_upvalues only ever holds Open entries"),
            })
            .unwrap_or(self.open_upvalues.len());
        self.open_upvalues.insert(insert_at, upvalue.clone());
        upvalue
    }

    /// Close every open upvalue aliasing a stack slot at or above `from`,
    /// snapshotting its current value before the slot is discarded.
    fn close_upvalues(&mut self, from: usize) {
        loop {
            let next = match self.open_upvalues.first() {
                Some(u) => match &*u.borrow() {
                    Upvalue::Open(loc) if *loc >= from => Some((u.clone(), *loc)),
                    _ => None,
                },
                None => None,
            };
            match next {
                Some((upvalue, loc)) => {
                    let value = self.stack[loc].clone();
                    *upvalue.borrow_mut() = Upvalue::Closed(value);
                    self.open_upvalues.remove(0);
                }
                None => break,
            }
        }
    }

    fn read_upvalue(&self, slot: u8) -> Value {
        let upvalue = self.frames.last().unwrap().closure.borrow().upvalues[slot as usize].clone();
        let value = match &*upvalue.borrow() {
            Upvalue::Open(loc) => self.stack[*loc].clone(),
            Upvalue::Closed(v) => v.clone(),
        };
        value
    }

    fn write_upvalue(&mut self, slot: u8, value: Value) {
        let upvalue = self.frames.last().unwrap().closure.borrow().upvalues[slot as usize].clone();
        let loc = match &*upvalue.borrow() {
            Upvalue::Open(l) => Some(*l),
            Upvalue::Closed(_) => None,
        };
        match loc {
            Some(l) => self.stack[l] = value,
            None => *upvalue.borrow_mut() = Upvalue::Closed(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn run(source: &str) -> String {
        let mut interner = Interner::new();
        let function = compile(source, &mut interner).expect("source should compile");
        let mut output = Vec::new();
        let mut vm = Vm::with_writer(interner, &mut output);
        vm.interpret(function).expect("source should run without error");
        String::from_utf8(output).expect("output should be UTF-8")
    }

    #[test]
    fn prints_arithmetic_result() {
        assert_eq!(run("print 1 + 2 * 3;"), "7\n");
    }

    #[test]
    fn string_concatenation_allocates_through_the_shared_interner() {
        assert_eq!(run("print \"foo\" + \"bar\";"), "foobar\n");
    }

    #[test]
    fn globals_round_trip_through_define_get_set() {
        assert_eq!(run("var x = 10; x = x + 5; print x;"), "15\n");
    }

    #[test]
    fn closures_capture_and_mutate_shared_upvalues() {
        let source = r#"
            def make_counter() {
                var count = 0;
                def increment() {
                    count = count + 1;
                    return count;
                }
                return increment;
            }
            var counter = make_counter();
            print counter();
            print counter();
            print counter();
        "#;
        assert_eq!(run(source), "1\n2\n3\n");
    }

    #[test]
    fn recursive_function_calls_resolve_by_name() {
        let source = r#"
            def fact(n) {
                if (n < 2) {
                    return 1;
                }
                return n * fact(n - 1);
            }
            print fact(5);
        "#;
        assert_eq!(run(source), "120\n");
    }

    #[test]
    fn if_elif_else_chain_picks_first_truthy_branch() {
        let source = r#"
            var n = 2;
            if (n == 1) {
                print "one";
            } elif (n == 2) {
                print "two";
            } else {
                print "other";
            }
        "#;
        assert_eq!(run(source), "two\n");
    }

    #[test]
    fn while_loop_runs_until_condition_is_falsey() {
        let source = r#"
            var i = 0;
            while (i < 3) {
                print i;
                i = i + 1;
            }
        "#;
        assert_eq!(run(source), "0\n1\n2\n");
    }

    #[test]
    fn zero_is_falsey_in_control_flow() {
        assert_eq!(run("if (0) { print \"truthy\"; } else { print \"falsey\"; }"), "falsey\n");
    }

    #[test]
    fn undefined_global_read_is_a_runtime_error() {
        let mut interner = Interner::new();
        let function = compile("print missing;", &mut interner).expect("source should compile");
        let mut output: Vec<u8> = Vec::new();
        let mut vm = Vm::with_writer(interner, &mut output);
        let err = vm.interpret(function).expect_err("undefined global should fail");
        assert!(err.message.contains("Undefined variable"));
    }

    #[test]
    fn assigning_to_undefined_global_does_not_define_it() {
        let mut interner = Interner::new();
        let function = compile("x = 1;", &mut interner).expect("source should compile");
        let mut output: Vec<u8> = Vec::new();
        let mut vm = Vm::with_writer(interner, &mut output);
        assert!(vm.interpret(function).is_err());
    }

    #[test]
    fn unbounded_recursion_is_a_stack_overflow_runtime_error() {
        let mut interner = Interner::new();
        let source = r#"
            def recurse(n) {
                return recurse(n + 1);
            }
            print recurse(0);
        "#;
        let function = compile(source, &mut interner).expect("source should compile");
        let mut output: Vec<u8> = Vec::new();
        let mut vm = Vm::with_writer(interner, &mut output);
        let err = vm.interpret(function).expect_err("unbounded recursion should overflow");
        assert!(err.message.contains("Stack overflow"));
    }
}
