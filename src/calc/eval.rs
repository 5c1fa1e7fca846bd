// パス: src/calc/eval.rs
// 役割: calc の AST を評価する木構造インタプリタ
// 意図: 環境（スコープ）管理と呼び出し履歴付きの実行時エラーを提供する
// 関連ファイル: src/calc/parser.rs, src/evaluator.rs, src/value.rs
//! 評価器
//!
//! - スコープは親を持つ連鎖で、変数参照は親方向へたどる。
//! - 代入は既存の束縛があればそこを書き換え、なければ現在のスコープに作る。
//! - 実行時エラーは内側の呼び出しが先頭の `Location` 列を持つ。

use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

use super::lexer::TokenKind;
use super::parser::{parse_program, Expr};
use super::Function;
use crate::errors::{Failure, Location};
use crate::evaluator::{Evaluation, Evaluator, ScopeId};
use crate::value::Value;

const MAX_CALL_DEPTH: usize = 200;

struct Scope {
    parent: Option<ScopeId>,
    vars: HashMap<String, Value>,
    target: Value,
}

/// 評価途中で巻き戻す理由。
enum Unwind {
    Fail(Failure),
    Exit(i32),
}

type EvalResult = Result<Value, Unwind>;

struct Frame {
    label: String,
    function: Option<String>,
    line: usize,
}

/// calc 言語の評価器。
#[derive(Default)]
pub struct Calc {
    scopes: Vec<Option<Scope>>,
    frames: Vec<Frame>,
}

impl Calc {
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0).and_then(Option::as_ref)
    }

    fn scope_mut(&mut self, id: ScopeId) -> Option<&mut Scope> {
        self.scopes.get_mut(id.0).and_then(Option::as_mut)
    }

    fn lookup(&self, mut id: ScopeId, name: &str) -> Option<&Value> {
        loop {
            let scope = self.scope(id)?;
            if let Some(v) = scope.vars.get(name) {
                return Some(v);
            }
            id = scope.parent?;
        }
    }

    fn assign(&mut self, scope: ScopeId, name: &str, value: Value) {
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            let Some(s) = self.scope_mut(id) else { break };
            if let Some(slot) = s.vars.get_mut(name) {
                *slot = value;
                return;
            }
            cursor = s.parent;
        }
        if let Some(s) = self.scope_mut(scope) {
            s.vars.insert(name.to_string(), value);
        }
    }

    fn target_of(&self, id: ScopeId) -> Value {
        self.scope(id)
            .map(|s| s.target.clone())
            .unwrap_or(Value::Nil)
    }

    fn set_line(&mut self, line: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    fn fail(&self, kind: &str, message: impl Into<String>) -> Unwind {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|f| Location::new(f.label.clone(), f.line, f.function.clone()))
            .collect();
        Unwind::Fail(Failure::new(kind, message).with_trace(trace))
    }

    fn eval(&mut self, expr: &Expr, scope: ScopeId, out: &mut dyn Write) -> EvalResult {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope, out)?);
                }
                Ok(Value::list(values))
            }
            Expr::Var { name, line } => {
                self.set_line(*line);
                if name == "self" {
                    return Ok(self.target_of(scope));
                }
                self.lookup(scope, name)
                    .cloned()
                    .ok_or_else(|| self.fail("NameError", format!("undefined variable `{}'", name)))
            }
            Expr::Assign { name, value } => {
                let v = self.eval(value, scope, out)?;
                self.assign(scope, name, v.clone());
                Ok(v)
            }
            Expr::Def(f) => {
                let v = Value::Func(Rc::clone(f));
                self.assign(scope, &f.name, v.clone());
                Ok(v)
            }
            Expr::Unary { op, operand, line } => {
                let v = self.eval(operand, scope, out)?;
                self.set_line(*line);
                match (op, v) {
                    (TokenKind::BANG, v) => Ok(Value::Bool(!v.truthy())),
                    (TokenKind::MINUS, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| self.fail("RangeError", "integer overflow")),
                    (_, v) => Err(self.fail(
                        "TypeError",
                        format!("bad operand for unary minus: {}", v.kind()),
                    )),
                }
            }
            Expr::Binary {
                op,
                left,
                right,
                line,
            } => {
                let l = self.eval(left, scope, out)?;
                let r = self.eval(right, scope, out)?;
                self.set_line(*line);
                self.binary(*op, l, r)
            }
            Expr::Call { name, args, line } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, scope, out)?);
                }
                self.set_line(*line);
                self.call(name, values, scope, out)
            }
            Expr::Index {
                target,
                index,
                line,
            } => {
                let t = self.eval(target, scope, out)?;
                let i = self.eval(index, scope, out)?;
                self.set_line(*line);
                self.index(t, i)
            }
            Expr::Method { target, name, line } => {
                let t = self.eval(target, scope, out)?;
                self.set_line(*line);
                self.method(&t, name)
            }
        }
    }

    fn binary(&self, op: TokenKind, l: Value, r: Value) -> EvalResult {
        use TokenKind::*;
        let overflow = || self.fail("RangeError", "integer overflow");
        match (op, &l, &r) {
            (EQ, _, _) => Ok(Value::Bool(l == r)),
            (NE, _, _) => Ok(Value::Bool(l != r)),
            (PLUS, Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or_else(overflow),
            (MINUS, Value::Int(a), Value::Int(b)) => a.checked_sub(*b).map(Value::Int).ok_or_else(overflow),
            (STAR, Value::Int(a), Value::Int(b)) => a.checked_mul(*b).map(Value::Int).ok_or_else(overflow),
            (SLASH | PERCENT, Value::Int(_), Value::Int(0)) => {
                Err(self.fail("ZeroDivisionError", "divided by 0"))
            }
            (SLASH, Value::Int(a), Value::Int(b)) => a.checked_div_euclid(*b).map(Value::Int).ok_or_else(overflow),
            (PERCENT, Value::Int(a), Value::Int(b)) => a.checked_rem_euclid(*b).map(Value::Int).ok_or_else(overflow),
            (PLUS, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            (PLUS, Value::List(a), Value::List(b)) => {
                let mut items = a.as_ref().clone();
                items.extend(b.iter().cloned());
                Ok(Value::list(items))
            }
            (STAR, Value::Str(s), Value::Int(n)) if *n >= 0 => Ok(Value::Str(s.repeat(*n as usize))),
            (LT | LE | GT | GE, Value::Int(a), Value::Int(b)) => Ok(Value::Bool(compare(op, a, b))),
            (LT | LE | GT | GE, Value::Str(a), Value::Str(b)) => Ok(Value::Bool(compare(op, a, b))),
            _ => Err(self.fail(
                "TypeError",
                format!("unsupported operand types: {} and {}", l.kind(), r.kind()),
            )),
        }
    }

    fn index(&self, target: Value, index: Value) -> EvalResult {
        match (&target, &index) {
            (Value::List(items), Value::Int(i)) => {
                Ok(resolve_index(*i, items.len()).map_or(Value::Nil, |n| items[n].clone()))
            }
            (Value::Str(s), Value::Int(i)) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(resolve_index(*i, chars.len())
                    .map_or(Value::Nil, |n| Value::Str(chars[n].to_string())))
            }
            (Value::Map(map), Value::Int(k)) => Ok(map.get(k).cloned().unwrap_or(Value::Nil)),
            _ => Err(self.fail(
                "TypeError",
                format!("cannot index {} with {}", target.kind(), index.kind()),
            )),
        }
    }

    fn method(&self, target: &Value, name: &str) -> EvalResult {
        let v = match (name, target) {
            ("kind", _) => Value::str(target.kind()),
            ("inspect", _) => Value::Str(target.inspect()),
            ("to_s", _) => Value::Str(target.to_display()),
            ("nil?", _) => Value::Bool(target.is_nil()),
            ("len", Value::Str(s)) => Value::Int(s.chars().count() as i64),
            ("len", Value::List(items)) => Value::Int(items.len() as i64),
            ("len", Value::Map(map)) => Value::Int(map.len() as i64),
            ("first", Value::List(items)) => items.first().cloned().unwrap_or(Value::Nil),
            ("last", Value::List(items)) => items.last().cloned().unwrap_or(Value::Nil),
            ("reverse", Value::List(items)) => Value::list(items.iter().rev().cloned().collect()),
            ("reverse", Value::Str(s)) => Value::Str(s.chars().rev().collect()),
            ("upcase", Value::Str(s)) => Value::Str(s.to_uppercase()),
            ("downcase", Value::Str(s)) => Value::Str(s.to_lowercase()),
            ("keys", Value::Map(map)) => Value::list(map.keys().map(|k| Value::Int(*k)).collect()),
            ("values", Value::Map(map)) => Value::list(map.values().cloned().collect()),
            ("sum", Value::List(items)) => {
                let mut total: i64 = 0;
                for item in items.iter() {
                    let Value::Int(i) = item else {
                        return Err(self.fail("TypeError", format!("cannot sum {}", item.kind())));
                    };
                    total = total
                        .checked_add(*i)
                        .ok_or_else(|| self.fail("RangeError", "integer overflow"))?;
                }
                Value::Int(total)
            }
            ("name", Value::Func(f)) => Value::Str(f.name.clone()),
            ("message", Value::Error(e)) => Value::Str(e.message.clone()),
            _ => {
                return Err(self.fail(
                    "NoMethodError",
                    format!("undefined method `{}' for {}", name, target.kind()),
                ))
            }
        };
        Ok(v)
    }

    fn call(&mut self, name: &str, args: Vec<Value>, scope: ScopeId, out: &mut dyn Write) -> EvalResult {
        if let Some(Value::Func(f)) = self.lookup(scope, name).cloned() {
            return self.apply(&f, args, scope, out);
        }
        match (name, args.as_slice()) {
            ("print" | "puts", items) => {
                let parts: Vec<String> = items.iter().map(Value::to_display).collect();
                writeln!(out, "{}", parts.join(" "))
                    .map_err(|e| self.fail("IOError", e.to_string()))?;
                Ok(Value::Nil)
            }
            ("raise", [msg]) => Err(self.fail("RuntimeError", msg.to_display())),
            ("raise", []) => Err(self.fail("RuntimeError", "unhandled exception")),
            ("exit", []) => Err(Unwind::Exit(0)),
            ("exit", [Value::Int(code)]) => Err(Unwind::Exit(*code as i32)),
            ("len", [v]) => self.method(v, "len"),
            ("str", [v]) => Ok(Value::Str(v.to_display())),
            ("inspect", [v]) => Ok(Value::Str(v.inspect())),
            ("range", [Value::Int(n)]) => Ok(Value::list((0..(*n).max(0)).map(Value::Int).collect())),
            ("push", [Value::List(items), v]) => {
                let mut items = items.as_ref().clone();
                items.push(v.clone());
                Ok(Value::list(items))
            }
            ("if", [cond, then, otherwise]) => Ok(if cond.truthy() {
                then.clone()
            } else {
                otherwise.clone()
            }),
            ("raise" | "exit" | "len" | "str" | "inspect" | "range" | "push" | "if", _) => {
                Err(self.fail(
                    "ArgumentError",
                    format!("wrong arguments for `{}' ({} given)", name, args.len()),
                ))
            }
            _ => Err(self.fail("NameError", format!("undefined function `{}'", name))),
        }
    }

    fn apply(&mut self, f: &Function, args: Vec<Value>, caller: ScopeId, out: &mut dyn Write) -> EvalResult {
        if args.len() != f.params.len() {
            return Err(self.fail(
                "ArgumentError",
                format!(
                    "wrong number of arguments for `{}' (given {}, expected {})",
                    f.name,
                    args.len(),
                    f.params.len()
                ),
            ));
        }
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(self.fail("SystemStackError", "stack level too deep"));
        }
        let target = self.target_of(caller);
        let local = self.open_scope(Some(caller), target);
        if let Some(s) = self.scope_mut(local) {
            for (param, arg) in f.params.iter().zip(args) {
                s.vars.insert(param.clone(), arg);
            }
        }
        self.frames.push(Frame {
            label: f.label.clone(),
            function: Some(f.name.clone()),
            line: f.line,
        });
        let result = self.eval(&f.body, local, out);
        self.frames.pop();
        self.close_scope(local);
        result
    }
}

fn compare<T: PartialOrd>(op: TokenKind, a: &T, b: &T) -> bool {
    match op {
        TokenKind::LT => a < b,
        TokenKind::LE => a <= b,
        TokenKind::GT => a > b,
        _ => a >= b,
    }
}

/// 負の添字は末尾から数える。
fn resolve_index(i: i64, len: usize) -> Option<usize> {
    let idx = if i < 0 { len as i64 + i } else { i };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}

impl Evaluator for Calc {
    fn open_scope(&mut self, parent: Option<ScopeId>, target: Value) -> ScopeId {
        let scope = Scope {
            parent,
            vars: HashMap::new(),
            target,
        };
        match self.scopes.iter().position(Option::is_none) {
            Some(idx) => {
                self.scopes[idx] = Some(scope);
                ScopeId(idx)
            }
            None => {
                self.scopes.push(Some(scope));
                ScopeId(self.scopes.len() - 1)
            }
        }
    }

    fn close_scope(&mut self, scope: ScopeId) {
        if let Some(slot) = self.scopes.get_mut(scope.0) {
            *slot = None;
        }
    }

    fn evaluate(&mut self, source: &str, scope: ScopeId, label: &str, out: &mut dyn Write) -> Evaluation {
        let program = match parse_program(source, label) {
            Ok(p) => p,
            Err(e) if e.incomplete => return Evaluation::Incomplete { message: e.to_string() },
            Err(e) => {
                return Evaluation::Failed(
                    Failure::new("SyntaxError", e.message.clone())
                        .with_trace(vec![Location::new(label, e.line, None)]),
                )
            }
        };
        let base = self.frames.len();
        self.frames.push(Frame {
            label: label.to_string(),
            function: None,
            line: 1,
        });
        let mut last = Value::Nil;
        let mut outcome = None;
        for stmt in &program.stmts {
            match self.eval(stmt, scope, out) {
                Ok(v) => last = v,
                Err(Unwind::Fail(f)) => {
                    outcome = Some(Evaluation::Failed(f));
                    break;
                }
                Err(Unwind::Exit(code)) => {
                    outcome = Some(Evaluation::Exit(code));
                    break;
                }
            }
        }
        self.frames.truncate(base);
        outcome.unwrap_or(Evaluation::Value(last))
    }

    fn set_var(&mut self, scope: ScopeId, name: &str, value: Value) {
        if let Some(s) = self.scope_mut(scope) {
            s.vars.insert(name.to_string(), value);
        }
    }

    fn query(&mut self, target: &Value, name: &str) -> Result<Value, Failure> {
        match self.method(target, name) {
            Ok(v) => Ok(v),
            Err(Unwind::Fail(f)) => Err(f),
            Err(Unwind::Exit(code)) => Err(Failure::new("Exit", format!("exit {}", code))),
        }
    }
}
