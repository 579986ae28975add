//! Restricted execution of model-generated analysis code.
//!
//! The original surface area of "run arbitrary analysis code against the
//! dataset" is narrowed to a small expression language evaluated in-process.
//! The only reachable binding is the loaded dataset under the name `df`
//! (plus assignments the code itself makes); the grammar has no file,
//! process, network, or import constructs, so the sandbox boundary is the
//! language itself. Printed output goes to a per-invocation buffer, never
//! the real stdout.

use crate::{CellValue, Dataset};
use regex::Regex;
use std::{collections::HashMap, fmt, sync::LazyLock};
use thiserror::Error;

/// Matches attempts to re-load data from a file. Generated code sometimes
/// reaches for a file-reading call out of habit; those calls are rewritten to
/// the already-loaded `df` before parsing.
static FILE_LOAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:pd\s*\.\s*)?(?:read_csv|read_table|read_json|read_parquet|load_dataset|open)\s*\([^)]*\)",
    )
    .expect("file-load pattern is valid")
});

/// Run analysis code against the dataset and return its captured output.
///
/// Never fails: parse and runtime errors are returned as their human-readable
/// rendering, scoped to this one invocation, so the agent can feed them back
/// to the model as a normal tool result.
#[must_use]
pub fn execute(code: &str, dataset: &Dataset) -> String {
    let code = sanitize(code);
    let mut interpreter = Interpreter::new(dataset);
    match interpreter.run(&code) {
        Ok(()) => interpreter.output,
        Err(error) => error.to_string(),
    }
}

/// Strip a leading markdown fence (with optional language tag), trailing
/// whitespace, and rewrite file-loading calls to reference `df`.
#[must_use]
pub fn sanitize(code: &str) -> String {
    let mut code = code.trim();
    if let Some(rest) = code.strip_prefix("```") {
        // The first line is a language tag when the fence spans lines; a
        // single-line fence has the code right after the marker.
        code = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest,
        };
        code = code.trim_end();
        if let Some(stripped) = code.strip_suffix("```") {
            code = stripped;
        }
    }
    FILE_LOAD_RE
        .replace_all(code, "df")
        .trim_end()
        .to_string()
}

#[derive(Debug, Error)]
enum SandboxError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("error on line {line}: {message}")]
    Eval { line: usize, message: String },
}

/// A runtime value of the analysis language.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Null,
    Number(f64),
    Str(String),
    List(Vec<Value>),
    /// The loaded dataset. There is exactly one, bound to `df`.
    Frame,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Frame => "dataframe",
        }
    }
}

impl From<&CellValue> for Value {
    fn from(cell: &CellValue) -> Self {
        match cell {
            CellValue::Null => Self::Null,
            CellValue::Number(n) => Self::Number(*n),
            CellValue::Text(s) => Self::Str(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Frame => write!(f, "<dataframe>"),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
}

fn tokenize(line: &str, line_no: usize) -> Result<Vec<Token>, SandboxError> {
    let syntax = |message: String| SandboxError::Syntax {
        line: line_no,
        message,
    };

    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '#' => break,
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Assign);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '"' | '\'' => {
                let quote = ch;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    text.push(c);
                }
                if !closed {
                    return Err(syntax("unterminated string literal".to_string()));
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| syntax(format!("invalid number literal '{literal}'")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(syntax(format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

struct Interpreter<'a> {
    dataset: &'a Dataset,
    env: HashMap<String, Value>,
    output: String,
}

impl<'a> Interpreter<'a> {
    fn new(dataset: &'a Dataset) -> Self {
        let mut env = HashMap::new();
        env.insert("df".to_string(), Value::Frame);
        Self {
            dataset,
            env,
            output: String::new(),
        }
    }

    fn run(&mut self, code: &str) -> Result<(), SandboxError> {
        for (index, line) in code.lines().enumerate() {
            let line_no = index + 1;
            let tokens = tokenize(line, line_no)?;
            if tokens.is_empty() {
                continue;
            }
            LineEval {
                tokens,
                pos: 0,
                line: line_no,
                interpreter: self,
            }
            .statement()?;
        }
        Ok(())
    }
}

struct LineEval<'a, 'b> {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
    interpreter: &'b mut Interpreter<'a>,
}

impl LineEval<'_, '_> {
    fn syntax(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn eval_error(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Eval {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), SandboxError> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            _ => Err(self.syntax(format!("expected {what}"))),
        }
    }

    fn expect_end(&self) -> Result<(), SandboxError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.syntax("unexpected trailing tokens"))
        }
    }

    fn statement(mut self) -> Result<(), SandboxError> {
        // print(expr, ...)
        if self.tokens.first() == Some(&Token::Ident("print".to_string()))
            && self.tokens.get(1) == Some(&Token::LParen)
        {
            self.pos = 2;
            let mut pieces = Vec::new();
            if self.peek() != Some(&Token::RParen) {
                loop {
                    let value = self.expression()?;
                    pieces.push(value.to_string());
                    match self.peek() {
                        Some(Token::Comma) => {
                            self.advance();
                        }
                        _ => break,
                    }
                }
            }
            self.expect(&Token::RParen, "')' to close print")?;
            self.expect_end()?;
            self.interpreter.output.push_str(&pieces.join(" "));
            self.interpreter.output.push('\n');
            return Ok(());
        }

        // name = expr
        if let (Some(Token::Ident(name)), Some(Token::Assign)) =
            (self.tokens.first(), self.tokens.get(1))
        {
            let name = name.clone();
            if name == "df" {
                return Err(self.eval_error("cannot rebind 'df'"));
            }
            self.pos = 2;
            let value = self.expression()?;
            self.expect_end()?;
            self.interpreter.env.insert(name, value);
            return Ok(());
        }

        // bare expression; evaluated for effect, value discarded
        let _ = self.expression()?;
        self.expect_end()
    }

    fn expression(&mut self) -> Result<Value, SandboxError> {
        let mut left = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let right = self.term()?;
                    left = self.add(left, right)?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    let right = self.term()?;
                    left = Value::Number(self.as_number(&left)? - self.as_number(&right)?);
                }
                _ => return Ok(left),
            }
        }
    }

    fn term(&mut self) -> Result<Value, SandboxError> {
        let mut left = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let right = self.unary()?;
                    left = Value::Number(self.as_number(&left)? * self.as_number(&right)?);
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.unary()?;
                    let divisor = self.as_number(&right)?;
                    if divisor == 0.0 {
                        return Err(self.eval_error("division by zero"));
                    }
                    left = Value::Number(self.as_number(&left)? / divisor);
                }
                _ => return Ok(left),
            }
        }
    }

    fn unary(&mut self) -> Result<Value, SandboxError> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            let value = self.unary()?;
            return Ok(Value::Number(-self.as_number(&value)?));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Value, SandboxError> {
        let mut value = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let Some(Token::Ident(name)) = self.advance() else {
                        return Err(self.syntax("expected attribute or method name after '.'"));
                    };
                    if self.peek() == Some(&Token::LParen) {
                        self.advance();
                        let args = self.call_arguments()?;
                        value = self.call_method(&value, &name, &args)?;
                    } else {
                        value = self.attribute(&value, &name)?;
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "']' to close index")?;
                    value = self.index(&value, &index)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn primary(&mut self) -> Result<Value, SandboxError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Str(s)) => Ok(Value::Str(s)),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.advance();
                    let args = self.call_arguments()?;
                    return self.call_function(&name, &args);
                }
                self.interpreter
                    .env
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| self.eval_error(format!("name '{name}' is not defined")))
            }
            _ => Err(self.syntax("expected an expression")),
        }
    }

    fn call_arguments(&mut self) -> Result<Vec<Value>, SandboxError> {
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                match self.peek() {
                    Some(Token::Comma) => {
                        self.advance();
                    }
                    _ => break,
                }
            }
        }
        self.expect(&Token::RParen, "')' to close arguments")?;
        Ok(args)
    }

    fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, SandboxError> {
        match name {
            "len" => match args {
                [Value::List(items)] => Ok(Value::Number(items.len() as f64)),
                [Value::Str(s)] => Ok(Value::Number(s.chars().count() as f64)),
                _ => Err(self.eval_error("len() takes one list or string argument")),
            },
            other => Err(self.eval_error(format!("unknown function '{other}'"))),
        }
    }

    fn attribute(&self, value: &Value, name: &str) -> Result<Value, SandboxError> {
        let dataset = self.interpreter.dataset;
        match (value, name) {
            (Value::Frame, "shape") => Ok(Value::List(vec![
                Value::Number(dataset.rows.len() as f64),
                Value::Number(dataset.columns.len() as f64),
            ])),
            (Value::Frame, "columns") => Ok(Value::List(
                dataset
                    .columns
                    .iter()
                    .map(|name| Value::Str(name.clone()))
                    .collect(),
            )),
            (value, name) => Err(self.eval_error(format!(
                "{} has no attribute '{name}'",
                value.type_name()
            ))),
        }
    }

    fn index(&self, value: &Value, index: &Value) -> Result<Value, SandboxError> {
        match (value, index) {
            (Value::Frame, Value::Str(column)) => {
                let dataset = self.interpreter.dataset;
                let column_index = dataset
                    .column_index(column)
                    .ok_or_else(|| self.eval_error(format!("column '{column}' does not exist")))?;
                Ok(Value::List(
                    dataset
                        .column_values(column_index)
                        .iter()
                        .map(Value::from)
                        .collect(),
                ))
            }
            (Value::List(items), Value::Number(n)) => {
                let position = *n as usize;
                if n.fract() != 0.0 || *n < 0.0 || position >= items.len() {
                    return Err(self.eval_error(format!("index {n} out of range")));
                }
                Ok(items[position].clone())
            }
            (value, index) => Err(self.eval_error(format!(
                "cannot index {} with {}",
                value.type_name(),
                index.type_name()
            ))),
        }
    }

    fn call_method(&self, value: &Value, name: &str, args: &[Value]) -> Result<Value, SandboxError> {
        let Value::List(items) = value else {
            return Err(self.eval_error(format!(
                "{} has no method '{name}'",
                value.type_name()
            )));
        };

        let numbers = || -> Vec<f64> {
            items
                .iter()
                .filter_map(|item| {
                    if let Value::Number(n) = item {
                        Some(*n)
                    } else {
                        None
                    }
                })
                .collect()
        };

        match name {
            "count" => Ok(Value::Number(
                items
                    .iter()
                    .filter(|item| !matches!(item, Value::Null))
                    .count() as f64,
            )),
            "sum" => Ok(Value::Number(numbers().iter().sum())),
            "mean" => {
                let numbers = numbers();
                if numbers.is_empty() {
                    return Err(self.eval_error("cannot compute the mean of a non-numeric or empty column"));
                }
                Ok(Value::Number(
                    numbers.iter().sum::<f64>() / numbers.len() as f64,
                ))
            }
            "min" | "max" => {
                let numbers = numbers();
                if numbers.is_empty() {
                    return Err(self.eval_error(format!(
                        "cannot compute the {name} of a non-numeric or empty column"
                    )));
                }
                let result = if name == "min" {
                    numbers.iter().copied().fold(f64::INFINITY, f64::min)
                } else {
                    numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max)
                };
                Ok(Value::Number(result))
            }
            "unique" => {
                let mut distinct: Vec<Value> = Vec::new();
                for item in items {
                    if !matches!(item, Value::Null) && !distinct.contains(item) {
                        distinct.push(item.clone());
                    }
                }
                Ok(Value::List(distinct))
            }
            "head" => {
                let count = match args {
                    [] => 5,
                    [Value::Number(n)] if n.fract() == 0.0 && *n >= 0.0 => *n as usize,
                    _ => return Err(self.eval_error("head() takes one non-negative integer")),
                };
                Ok(Value::List(items.iter().take(count).cloned().collect()))
            }
            other => Err(self.eval_error(format!("list has no method '{other}'"))),
        }
    }

    fn add(&self, left: Value, right: Value) -> Result<Value, SandboxError> {
        match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            _ => Ok(Value::Number(
                self.as_number(&left)? + self.as_number(&right)?,
            )),
        }
    }

    fn as_number(&self, value: &Value) -> Result<f64, SandboxError> {
        if let Value::Number(n) = value {
            Ok(*n)
        } else {
            Err(self.eval_error(format!("expected a number, got {}", value.type_name())))
        }
    }
}
