//! # Compiler
//!
//! A single-pass Pratt parser (§4.2): there is no intermediate AST, each
//! grammar rule emits bytecode directly into the [`Chunk`](crate::chunk::Chunk)
//! of whichever function is currently being compiled.
//!
//! Nested function bodies are compiled with a stack of [`FunctionScope`]s
//! (innermost last) rather than the source's chain of file-scope statics.
//! Each scope owns its own locals, upvalue descriptors and in-progress
//! [`ObjFunction`]; `self.scopes.pop()` at the end of a function body hands
//! the finished function back to the enclosing scope, which is exactly the
//! "restore the enclosing compiler" step the source does through a pointer
//! field.

use std::rc::Rc;

use crate::chunk::{Instr, UpvalueCapture};
use crate::error::{CompileError, CompileErrors};
use crate::object::{FunctionKind, Interner, ObjFunction};
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

struct ParseRule {
    prefix: bool,
    infix: bool,
    precedence: Precedence,
}

/// Lookup the grammar rule for a token kind. A match expression stands in
/// for the source's indexable table of function pointers (§9): there is no
/// uniform function signature to store prefix/infix parsers under in safe
/// Rust without a trait object per rule, so `Compiler::parse_precedence`
/// dispatches on `kind` directly instead of through this table.
fn rule(kind: TokenKind) -> ParseRule {
    use TokenKind::*;
    match kind {
        LeftParen => ParseRule { prefix: true, infix: true, precedence: Precedence::Call },
        Minus => ParseRule { prefix: true, infix: true, precedence: Precedence::Term },
        Plus => ParseRule { prefix: false, infix: true, precedence: Precedence::Term },
        Slash | Star => ParseRule { prefix: false, infix: true, precedence: Precedence::Factor },
        Bang => ParseRule { prefix: true, infix: false, precedence: Precedence::None },
        BangEqual | EqualEqual => ParseRule { prefix: false, infix: true, precedence: Precedence::Equality },
        Greater | GreaterEqual | Less | LessEqual => {
            ParseRule { prefix: false, infix: true, precedence: Precedence::Comparison }
        }
        Identifier | Number | String | True | False | Nil => {
            ParseRule { prefix: true, infix: false, precedence: Precedence::None }
        }
        And => ParseRule { prefix: false, infix: true, precedence: Precedence::And },
        Or => ParseRule { prefix: false, infix: true, precedence: Precedence::Or },
        _ => ParseRule { prefix: false, infix: false, precedence: Precedence::None },
    }
}

struct Local<'src> {
    name: &'src str,
    depth: i32,
    is_captured: bool,
}

struct FunctionScope<'src> {
    function: ObjFunction,
    kind: FunctionKind,
    locals: Vec<Local<'src>>,
    upvalues: Vec<UpvalueCapture>,
    scope_depth: i32,
}

impl<'src> FunctionScope<'src> {
    fn new(name: Option<Rc<crate::object::ObjString>>, kind: FunctionKind) -> Self {
        // Slot 0 is reserved: the VM places the called closure itself
        // there so a bare function name inside its own body can resolve
        // without a dedicated "this" opcode.
        let locals = vec![Local { name: "", depth: 0, is_captured: false }];
        FunctionScope {
            function: ObjFunction::new(name, kind),
            kind,
            locals,
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

pub struct Compiler<'src, 'i> {
    scanner: Scanner<'src>,
    interner: &'i mut Interner,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    scopes: Vec<FunctionScope<'src>>,
}

/// Compile a whole program into a top-level [`ObjFunction`] (§4.2). On
/// failure returns every diagnostic gathered, not just the first: the
/// parser keeps going in panic-mode recovery so one pass can report
/// several mistakes at once.
pub fn compile(source: &str, interner: &mut Interner) -> Result<Rc<ObjFunction>, CompileErrors> {
    let mut compiler = Compiler::new(source, interner);
    compiler.advance();
    while !compiler.check(TokenKind::Eof) {
        compiler.declaration();
    }
    let function = compiler.end_function();

    if compiler.had_error {
        Err(CompileErrors(compiler.errors))
    } else {
        Ok(Rc::new(function))
    }
}

impl<'src, 'i> Compiler<'src, 'i> {
    fn new(source: &'src str, interner: &'i mut Interner) -> Self {
        let scanner = Scanner::new(source);
        let placeholder = Token { kind: TokenKind::Eof, lexeme: "", line: 0 };
        let mut compiler = Compiler {
            scanner,
            interner,
            previous: placeholder,
            current: placeholder,
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            scopes: Vec::new(),
        };
        compiler.scopes.push(FunctionScope::new(None, FunctionKind::TopLevel));
        compiler
    }

    // ---- token stream plumbing -------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = self.current.lexeme.to_string();
            self.error_at_current(&message);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        let message = message.to_string();
        self.error_at_current(&message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current.line, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous.line, message);
    }

    fn error_at(&mut self, line: u32, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        self.errors.push(CompileError { line, message: message.to_string() });
    }

    /// Skip tokens until a statement boundary, so one syntax error
    /// doesn't cascade into a flood of spurious follow-on errors (§4.2,
    /// §7).
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Def
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // ---- function scope helpers --------------------------------------

    fn current_scope(&self) -> &FunctionScope<'src> {
        self.scopes.last().expect("a function scope is always active while compiling")
    }

    fn current_scope_mut(&mut self) -> &mut FunctionScope<'src> {
        self.scopes.last_mut().expect("a function scope is always active while compiling")
    }

    fn emit(&mut self, instr: Instr) -> usize {
        let line = self.previous.line;
        self.current_scope_mut().function.chunk.emit(instr, line)
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        match self.current_scope_mut().function.chunk.add_constant(value) {
            Some(index) => index,
            None => {
                self.error("Too many constants in one function.");
                0
            }
        }
    }

    /// Pop the innermost scope, appending an implicit `nil; return` tail
    /// (§4.2) and handing the finished function to the caller.
    fn end_function(&mut self) -> ObjFunction {
        self.emit(Instr::Nil);
        self.emit(Instr::Return);
        let scope = self.scopes.pop().expect("end_function called with no active scope");
        scope.function
    }

    // ---- scopes (blocks) ---------------------------------------------

    fn begin_scope(&mut self) {
        self.current_scope_mut().scope_depth += 1;
    }

    /// Pop locals that fall out of scope, back to front. A captured local
    /// emits `CloseUpvalue` (promoting the open upvalue alias to an owned
    /// value) instead of a bare `Pop`, since its frame slot is about to go
    /// away (§4.3 "CloseUpvalue").
    fn end_scope(&mut self) {
        self.current_scope_mut().scope_depth -= 1;
        let depth = self.current_scope().scope_depth;

        loop {
            let should_pop = match self.current_scope().locals.last() {
                Some(local) => local.depth > depth,
                None => false,
            };
            if !should_pop {
                break;
            }
            let captured = self
                .current_scope_mut()
                .locals
                .pop()
                .expect("should_pop implies a local exists")
                .is_captured;
            if captured {
                self.emit(Instr::CloseUpvalue);
            } else {
                self.emit(Instr::Pop);
            }
        }
    }

    // ---- locals / upvalues ---------------------------------------------

    fn add_local(&mut self, name: &'src str) {
        if self.current_scope().locals.len() >= u8::MAX as usize + 1 {
            self.error("Too many local variables in one function.");
            return;
        }
        // Two-phase declaration: depth -1 marks "not yet initialized", so
        // `var x = x;` cannot resolve its own right-hand `x` to itself.
        self.current_scope_mut().locals.push(Local { name, depth: -1, is_captured: false });
    }

    fn mark_initialized(&mut self) {
        let scope = self.current_scope_mut();
        if scope.scope_depth == 0 {
            return;
        }
        let depth = scope.scope_depth;
        if let Some(local) = scope.locals.last_mut() {
            local.depth = depth;
        }
    }

    fn declare_variable(&mut self, name: &'src str) {
        let scope_depth = self.current_scope().scope_depth;
        if scope_depth == 0 {
            return;
        }
        let mut conflict = false;
        {
            let scope = self.current_scope();
            for local in scope.locals.iter().rev() {
                if local.depth != -1 && local.depth < scope_depth {
                    break;
                }
                if local.name == name {
                    conflict = true;
                    break;
                }
            }
        }
        if conflict {
            self.error("Already a variable with this name in this scope.");
            return;
        }
        self.add_local(name);
    }

    fn resolve_local(&mut self, scope_index: usize, name: &str) -> Option<u8> {
        let mut found: Option<(u8, bool)> = None;
        {
            let scope = &self.scopes[scope_index];
            for (i, local) in scope.locals.iter().enumerate().rev() {
                if local.name == name {
                    found = Some((i as u8, local.depth == -1));
                    break;
                }
            }
        }
        let (index, uninitialized) = found?;
        if uninitialized {
            self.error("Can't read local variable in its own initializer.");
        }
        Some(index)
    }

    fn add_upvalue(&mut self, scope_index: usize, index: u8, is_local: bool) -> u8 {
        {
            let scope = &self.scopes[scope_index];
            for (i, up) in scope.upvalues.iter().enumerate() {
                if up.index == index && up.is_local == is_local {
                    return i as u8;
                }
            }
        }
        if self.scopes[scope_index].upvalues.len() >= u8::MAX as usize + 1 {
            self.error("Too many closure variables in one function.");
            return 0;
        }
        let scope = &mut self.scopes[scope_index];
        scope.upvalues.push(UpvalueCapture { index, is_local });
        scope.function.upvalue_count = scope.upvalues.len() as u8;
        (scope.upvalues.len() - 1) as u8
    }

    /// Resolve `name` as an upvalue of `scopes[scope_index]`, capturing it
    /// from an enclosing scope's locals (or chaining through that scope's
    /// own upvalues) as needed. Mirrors the source's `resolveUpvalue`
    /// recursion, walking the scope stack instead of a compiler-pointer
    /// chain.
    fn resolve_upvalue(&mut self, scope_index: usize, name: &str) -> Option<u8> {
        if scope_index == 0 {
            return None;
        }
        let enclosing = scope_index - 1;

        if let Some(local) = self.resolve_local(enclosing, name) {
            self.scopes[enclosing].locals[local as usize].is_captured = true;
            return Some(self.add_upvalue(scope_index, local, true));
        }

        if let Some(upvalue) = self.resolve_upvalue(enclosing, name) {
            return Some(self.add_upvalue(scope_index, upvalue, false));
        }

        None
    }

    // ---- declarations ---------------------------------------------------

    fn declaration(&mut self) {
        if self.matches(TokenKind::Def) {
            self.func_declaration();
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn func_declaration(&mut self) {
        let name = self.parse_variable("Expect function name.");
        // Pre-mark initialized so the function's own name is visible
        // inside its body, enabling direct recursion.
        self.mark_initialized();
        self.function(FunctionKind::Function);
        self.define_variable(name);
    }

    fn function(&mut self, kind: FunctionKind) {
        let name = self.interner.intern(self.previous.lexeme);
        self.scopes.push(FunctionScope::new(Some(name), kind));
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "Expect '(' after function name.");
        if !self.check(TokenKind::RightParen) {
            let mut arity: u16 = 0;
            loop {
                arity += 1;
                if arity > 255 {
                    self.error_at_current("Can't have more than 255 parameters.");
                }
                let constant = self.parse_variable("Expect parameter name.");
                self.define_variable(constant);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.current_scope_mut().function.arity = arity.min(255) as u8;
        }
        self.consume(TokenKind::RightParen, "Expect ')' after parameters.");
        self.consume(TokenKind::LeftBrace, "Expect '{' before function body.");
        self.block();

        let upvalues = self.current_scope().upvalues.clone();
        let function = self.end_function();
        let constant = self.make_constant(Value::function(Rc::new(function)));
        self.emit(Instr::Closure(constant, upvalues));
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit(Instr::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    /// Consume an identifier token, declaring it as a local (if inside a
    /// scope) and returning the constant-pool index to use for
    /// `DefineGlobal`/`GetGlobal` when it turns out to be global instead.
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        let name = self.previous.lexeme;

        self.declare_variable(name);
        if self.current_scope().scope_depth > 0 {
            return 0;
        }

        let interned = self.interner.intern(name);
        self.make_constant(Value::string(interned))
    }

    fn define_variable(&mut self, global: u8) {
        if self.current_scope().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit(Instr::DefineGlobal(global));
    }

    // ---- statements -------------------------------------------------

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit(Instr::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit(Instr::Pop);
    }

    fn return_statement(&mut self) {
        if self.current_scope().kind == FunctionKind::TopLevel {
            self.error("Can't return from top-level code.");
        }

        if self.matches(TokenKind::Semicolon) {
            self.emit(Instr::Nil);
        } else {
            self.expression();
            self.consume(TokenKind::Semicolon, "Expect ';' after return value.");
        }
        self.emit(Instr::Return);
    }

    /// `if`/`elif`/`else`, chaining each `elif` as the `else`-branch of
    /// the previous condition (§4.2). Every branch ends by jumping past
    /// the whole chain; those jumps are patched once the chain's final
    /// token has been consumed.
    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let mut end_jumps = Vec::new();
        let then_jump = self.emit(Instr::JumpIfFalse(0));
        self.emit(Instr::Pop);
        self.statement();
        end_jumps.push(self.emit(Instr::Jump(0)));
        let mut next_target = self.current_scope().function.chunk.next_index();
        self.current_scope_mut().function.chunk.patch(then_jump, Instr::JumpIfFalse(next_target));
        self.emit(Instr::Pop);

        while self.matches(TokenKind::Elif) {
            self.consume(TokenKind::LeftParen, "Expect '(' after 'elif'.");
            self.expression();
            self.consume(TokenKind::RightParen, "Expect ')' after condition.");

            let elif_jump = self.emit(Instr::JumpIfFalse(0));
            self.emit(Instr::Pop);
            self.statement();
            end_jumps.push(self.emit(Instr::Jump(0)));
            next_target = self.current_scope().function.chunk.next_index();
            self.current_scope_mut().function.chunk.patch(elif_jump, Instr::JumpIfFalse(next_target));
            self.emit(Instr::Pop);
        }

        if self.matches(TokenKind::Else) {
            self.statement();
        }

        let end_target = self.current_scope().function.chunk.next_index();
        for jump in end_jumps {
            self.current_scope_mut().function.chunk.patch(jump, Instr::Jump(end_target));
        }
    }

    fn while_statement(&mut self) {
        let loop_start = self.current_scope().function.chunk.next_index();

        self.consume(TokenKind::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit(Instr::JumpIfFalse(0));
        self.emit(Instr::Pop);
        self.statement();
        self.emit(Instr::Jump(loop_start));

        let after_loop = self.current_scope().function.chunk.next_index();
        self.current_scope_mut().function.chunk.patch(exit_jump, Instr::JumpIfFalse(after_loop));
        self.emit(Instr::Pop);
    }

    // ---- expressions -------------------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            self.infix(self.previous.kind, can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    fn prefix(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        match kind {
            TokenKind::LeftParen => self.grouping(),
            TokenKind::Minus | TokenKind::Bang => self.unary(),
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Identifier => self.variable(can_assign),
            TokenKind::True | TokenKind::False | TokenKind::Nil => self.literal(),
            _ => return false,
        }
        true
    }

    fn infix(&mut self, kind: TokenKind, _can_assign: bool) {
        match kind {
            TokenKind::LeftParen => self.call(),
            TokenKind::Minus | TokenKind::Plus | TokenKind::Slash | TokenKind::Star => self.binary(),
            TokenKind::BangEqual
            | TokenKind::EqualEqual
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => self.binary(),
            TokenKind::And => self.and(),
            TokenKind::Or => self.or(),
            _ => {}
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit(Instr::Negate),
            TokenKind::Bang => self.emit(Instr::Not),
            _ => unreachable!("unary() called with non-unary operator"),
        };
    }

    fn binary(&mut self) {
        let operator = self.previous.kind;
        let next = rule(operator).precedence.next();
        self.parse_precedence(next);

        match operator {
            TokenKind::Plus => self.emit(Instr::Add),
            TokenKind::Minus => self.emit(Instr::Subtract),
            TokenKind::Star => self.emit(Instr::Multiply),
            TokenKind::Slash => self.emit(Instr::Divide),
            TokenKind::EqualEqual => self.emit(Instr::Equal),
            TokenKind::BangEqual => {
                self.emit(Instr::Equal);
                self.emit(Instr::Not)
            }
            TokenKind::Greater => self.emit(Instr::Greater),
            TokenKind::GreaterEqual => {
                self.emit(Instr::Less);
                self.emit(Instr::Not)
            }
            TokenKind::Less => self.emit(Instr::Less),
            TokenKind::LessEqual => {
                self.emit(Instr::Greater);
                self.emit(Instr::Not)
            }
            _ => unreachable!("binary() called with non-binary operator"),
        };
    }

    /// Short-circuiting `and`: if the left side is falsey, leave it on
    /// the stack and skip the right side entirely.
    fn and(&mut self) {
        let end_jump = self.emit(Instr::JumpIfFalse(0));
        self.emit(Instr::Pop);
        self.parse_precedence(Precedence::And);
        let end = self.current_scope().function.chunk.next_index();
        self.current_scope_mut().function.chunk.patch(end_jump, Instr::JumpIfFalse(end));
    }

    /// Short-circuiting `or`: if the left side is truthy, skip straight
    /// past the right side.
    fn or(&mut self) {
        let else_jump = self.emit(Instr::JumpIfFalse(0));
        let end_jump = self.emit(Instr::Jump(0));

        let else_target = self.current_scope().function.chunk.next_index();
        self.current_scope_mut().function.chunk.patch(else_jump, Instr::JumpIfFalse(else_target));
        self.emit(Instr::Pop);

        self.parse_precedence(Precedence::Or);
        let end = self.current_scope().function.chunk.next_index();
        self.current_scope_mut().function.chunk.patch(end_jump, Instr::Jump(end));
    }

    fn call(&mut self) {
        let arg_count = self.argument_list();
        self.emit(Instr::Call(arg_count));
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("Can't have more than 255 arguments.");
                }
                count += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "Expect ')' after arguments.");
        count as u8
    }

    fn number(&mut self) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(0.0);
        let constant = self.make_constant(Value::Number(value));
        self.emit(Instr::Constant(constant));
    }

    fn string(&mut self) {
        let interned = self.interner.intern(self.previous.lexeme);
        let constant = self.make_constant(Value::string(interned));
        self.emit(Instr::Constant(constant));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::True => self.emit(Instr::True),
            TokenKind::False => self.emit(Instr::False),
            TokenKind::Nil => self.emit(Instr::Nil),
            _ => unreachable!("literal() called with non-literal token"),
        };
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous.lexeme, can_assign);
    }

    /// Resolve `name` to a local slot, an upvalue, or (failing both) a
    /// global, then emit the matching get/set instruction. A trailing
    /// `= expr` is only honored when `can_assign` is set, which is how
    /// `a = b = 1` inside a higher-precedence context like `-a = 1`
    /// correctly reports "Invalid assignment target." instead of silently
    /// parsing the `=` as part of a lower-precedence expression.
    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let scope_index = self.scopes.len() - 1;

        enum Slot {
            Local(u8),
            Upvalue(u8),
            Global(u8),
        }

        let slot = if let Some(index) = self.resolve_local(scope_index, name) {
            Slot::Local(index)
        } else if let Some(index) = self.resolve_upvalue(scope_index, name) {
            Slot::Upvalue(index)
        } else {
            let interned = self.interner.intern(name);
            let index = self.make_constant(Value::string(interned));
            Slot::Global(index)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            match slot {
                Slot::Local(index) => self.emit(Instr::SetLocal(index)),
                Slot::Upvalue(index) => self.emit(Instr::SetUpvalue(index)),
                Slot::Global(index) => self.emit(Instr::SetGlobal(index)),
            };
        } else {
            match slot {
                Slot::Local(index) => self.emit(Instr::GetLocal(index)),
                Slot::Upvalue(index) => self.emit(Instr::GetUpvalue(index)),
                Slot::Global(index) => self.emit(Instr::GetGlobal(index)),
            };
        }
    }
}
