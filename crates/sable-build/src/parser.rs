//! Parser for `.sb` class definition sources
//!
//! The language is line-oriented: one declaration or statement per line,
//! blocks closed with `end`. The parser never aborts on a bad line; it
//! records a diagnostic with the 1-based line and column of the offending
//! token and keeps going, so one pass reports every problem in a file.

use sable_core::{TypeTag, Value};

use crate::diagnostics::{codes, Diagnostic};

/// A parsed source file
#[derive(Debug, Default)]
pub struct SourceModule {
    pub name: String,
    pub enums: Vec<EnumDecl>,
    pub classes: Vec<ClassDecl>,
}

#[derive(Debug)]
pub struct EnumDecl {
    pub name: String,
    pub underlying: TypeTag,
    pub variants: Vec<(String, i64)>,
}

#[derive(Debug)]
pub struct ClassDecl {
    pub name: String,
    pub is_interface: bool,
    pub parents: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub properties: Vec<PropDecl>,
    pub methods: Vec<MethodDecl>,
    pub line: u32,
}

#[derive(Debug)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeTag,
    pub is_static: bool,
    pub readonly: bool,
    pub default: Option<Value>,
}

#[derive(Debug)]
pub struct PropDecl {
    pub name: String,
    pub ty: TypeTag,
    pub is_static: bool,
    pub can_read: bool,
    pub can_write: bool,
}

#[derive(Debug)]
pub struct MethodDecl {
    pub name: String,
    pub is_static: bool,
    pub params: Vec<ParamDecl>,
    pub body: Vec<SetStmt>,
    pub line: u32,
}

#[derive(Debug)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeTag,
    pub by_ref: bool,
}

/// `set <field> = <expr>`
#[derive(Debug)]
pub struct SetStmt {
    pub target: String,
    pub expr: Expr,
    pub line: u32,
    pub column: u32,
}

/// At most one binary operator per expression
#[derive(Debug)]
pub struct Expr {
    pub lhs: Operand,
    pub rest: Option<(BinOp, Operand)>,
}

#[derive(Debug)]
pub enum Operand {
    Literal(Value),
    /// A field, static field, or argument name, resolved during codegen
    Ident(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
}

/// Outcome of parsing one source file
pub struct ParseResult {
    pub module: SourceModule,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a `.sb` source file
pub fn parse(filename: &str, source: &str) -> ParseResult {
    Parser::new(filename).run(source)
}

struct Parser<'a> {
    filename: &'a str,
    module: SourceModule,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Parser<'a> {
    fn new(filename: &'a str) -> Self {
        Self {
            filename,
            module: SourceModule::default(),
            diagnostics: Vec::new(),
        }
    }

    fn run(mut self, source: &str) -> ParseResult {
        let lines: Vec<Line> = source
            .lines()
            .enumerate()
            .map(|(index, text)| Line::new(index as u32 + 1, text))
            .filter(|line| !line.is_blank())
            .collect();
        let mut lines = lines.into_iter();

        while let Some(line) = lines.next() {
            match line.keyword() {
                "module" => {
                    if self.module.name.is_empty() {
                        self.module.name = line.rest(1).to_string();
                    } else {
                        self.error(&line, 1, "duplicate module declaration");
                    }
                }
                "enum" => self.parse_enum(line, &mut lines),
                "class" => self.parse_class(line, &mut lines, false),
                "interface" => self.parse_class(line, &mut lines, true),
                other => {
                    self.error(
                        &line,
                        1,
                        format!("expected a top-level declaration, found `{other}`"),
                    );
                }
            }
        }

        if self.module.name.is_empty() {
            self.diagnostics.push(Diagnostic::error(
                self.filename,
                1,
                1,
                codes::SYNTAX,
                "missing module declaration",
            ));
        }

        ParseResult {
            module: self.module,
            diagnostics: self.diagnostics,
        }
    }

    /// `enum <name> : <underlying>` ... `Name = value` ... `end`
    fn parse_enum(&mut self, header: Line, lines: &mut LineIter) {
        let rest = header.rest(1);
        let (name, underlying) = match rest.split_once(':') {
            Some((name, ty)) => {
                let ty = match self.parse_type(&header, ty.trim()) {
                    Some(ty) => ty,
                    None => return self.skip_block(lines),
                };
                (name.trim().to_string(), ty)
            }
            None => (rest.to_string(), TypeTag::I32),
        };
        if name.is_empty() {
            self.error(&header, 2, "enum name is required");
            return self.skip_block(lines);
        }

        let mut variants = Vec::new();
        for line in lines.by_ref() {
            if line.keyword() == "end" {
                self.module.enums.push(EnumDecl {
                    name,
                    underlying,
                    variants,
                });
                return;
            }
            match line.text.split_once('=') {
                Some((variant, value)) => match value.trim().parse::<i64>() {
                    Ok(value) => variants.push((variant.trim().to_string(), value)),
                    Err(_) => self.error(&line, 1, "enum variant value must be an integer"),
                },
                None => {
                    let next = variants.last().map(|(_, v)| v + 1).unwrap_or(0);
                    variants.push((line.text.trim().to_string(), next));
                }
            }
        }
        self.unterminated(&header, "enum");
    }

    /// `class <name> [: parent, ...]` members `end`
    fn parse_class(&mut self, header: Line, lines: &mut LineIter, is_interface: bool) {
        let rest = header.rest(1);
        let (name, parents) = match rest.split_once(':') {
            Some((name, parents)) => (
                name.trim().to_string(),
                parents
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
            None => (rest.to_string(), Vec::new()),
        };
        if name.is_empty() {
            self.error(&header, 2, "class name is required");
            return self.skip_block(lines);
        }
        if self.module.classes.iter().any(|c| c.name == name) {
            self.diagnostics.push(Diagnostic::error(
                self.filename,
                header.number,
                1,
                codes::DUPLICATE_CLASS,
                format!("class `{name}` is already defined"),
            ));
            return self.skip_block(lines);
        }

        let mut class = ClassDecl {
            name,
            is_interface,
            parents,
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            line: header.number,
        };

        while let Some(line) = lines.next() {
            let mut words = line.words();
            let mut is_static = false;
            let mut readonly = false;
            let mut keyword = words.next().unwrap_or_default();
            while keyword == "static" || keyword == "readonly" {
                if keyword == "static" {
                    is_static = true;
                } else {
                    readonly = true;
                }
                keyword = words.next().unwrap_or_default();
            }

            match keyword {
                "end" => {
                    self.module.classes.push(class);
                    return;
                }
                "field" | "var" => {
                    if keyword == "var" {
                        self.diagnostics.push(Diagnostic::warning(
                            self.filename,
                            line.number,
                            1,
                            codes::VAR_DEPRECATED,
                            "`var` is deprecated, use `field`",
                        ));
                    }
                    if let Some(field) = self.parse_field(&line, is_static, readonly) {
                        class.fields.push(field);
                    }
                }
                "prop" => {
                    if let Some(prop) = self.parse_prop(&line, is_static) {
                        class.properties.push(prop);
                    }
                }
                "method" => {
                    if let Some(method) = self.parse_method(&line, lines, is_static, is_interface) {
                        if class
                            .methods
                            .iter()
                            .any(|m| m.name == method.name && m.params.len() == method.params.len())
                        {
                            self.diagnostics.push(Diagnostic::warning(
                                self.filename,
                                line.number,
                                1,
                                codes::DUPLICATE_OVERLOAD,
                                format!(
                                    "method `{}` with {} parameter(s) is already defined; \
                                     lookup by arity resolves the first declaration",
                                    method.name,
                                    method.params.len()
                                ),
                            ));
                        }
                        class.methods.push(method);
                    }
                }
                other => {
                    self.error(&line, 1, format!("unexpected member `{other}`"));
                }
            }
        }
        self.unterminated(&header, "class");
    }

    /// `field <name>: <type> [= <literal>]`
    fn parse_field(&mut self, line: &Line, is_static: bool, readonly: bool) -> Option<FieldDecl> {
        let rest = line.after_keyword();
        let (decl, default_text) = match rest.split_once('=') {
            Some((decl, default)) => (decl, Some(default.trim())),
            None => (rest, None),
        };
        let (name, ty_text) = match decl.split_once(':') {
            Some((name, ty)) => (name.trim(), ty.trim()),
            None => {
                self.error(line, 1, "field requires `name: type`");
                return None;
            }
        };
        let ty = self.parse_type(line, ty_text)?;
        let default = match default_text {
            Some(text) => Some(self.parse_literal(line, &ty, text)?),
            None => None,
        };
        Some(FieldDecl {
            name: name.to_string(),
            ty,
            is_static,
            readonly,
            default,
        })
    }

    /// `prop <name>: <type> { get set }`
    fn parse_prop(&mut self, line: &Line, is_static: bool) -> Option<PropDecl> {
        let rest = line.after_keyword();
        let (decl, accessors) = match rest.split_once('{') {
            Some((decl, tail)) => match tail.split_once('}') {
                Some((accessors, _)) => (decl, accessors),
                None => {
                    self.error(line, 1, "unterminated accessor list");
                    return None;
                }
            },
            None => {
                self.error(line, 1, "prop requires `{ get set }` accessors");
                return None;
            }
        };
        let (name, ty_text) = match decl.split_once(':') {
            Some((name, ty)) => (name.trim(), ty.trim()),
            None => {
                self.error(line, 1, "prop requires `name: type`");
                return None;
            }
        };
        let ty = self.parse_type(line, ty_text)?;

        let mut can_read = false;
        let mut can_write = false;
        for accessor in accessors.split_whitespace() {
            match accessor {
                "get" => can_read = true,
                "set" => can_write = true,
                other => {
                    self.error(line, 1, format!("unknown accessor `{other}`"));
                    return None;
                }
            }
        }
        Some(PropDecl {
            name: name.to_string(),
            ty,
            is_static,
            can_read,
            can_write,
        })
    }

    /// `method <name>(<params>)` body `end`; interface methods have no body
    fn parse_method(
        &mut self,
        header: &Line,
        lines: &mut LineIter,
        is_static: bool,
        is_interface: bool,
    ) -> Option<MethodDecl> {
        let rest = header.after_keyword();
        let (name, tail) = match rest.split_once('(') {
            Some((name, tail)) => (name.trim(), tail),
            None => {
                self.error(header, 1, "method requires a parameter list");
                return None;
            }
        };
        let params_text = match tail.split_once(')') {
            Some((params, _)) => params,
            None => {
                self.error(header, 1, "unterminated parameter list");
                return None;
            }
        };

        let mut params = Vec::new();
        for part in params_text.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (by_ref, part) = match part.strip_prefix("ref ") {
                Some(rest) => (true, rest.trim()),
                None => (false, part),
            };
            let (pname, ty_text) = match part.split_once(':') {
                Some((pname, ty)) => (pname.trim(), ty.trim()),
                None => {
                    self.error(header, 1, "parameter requires `name: type`");
                    return None;
                }
            };
            let ty = self.parse_type(header, ty_text)?;
            params.push(ParamDecl {
                name: pname.to_string(),
                ty,
                by_ref,
            });
        }

        if is_interface {
            return Some(MethodDecl {
                name: name.to_string(),
                is_static,
                params,
                body: Vec::new(),
                line: header.number,
            });
        }

        let mut body = Vec::new();
        for line in lines.by_ref() {
            match line.keyword() {
                "end" => {
                    return Some(MethodDecl {
                        name: name.to_string(),
                        is_static,
                        params,
                        body,
                        line: header.number,
                    });
                }
                "set" => {
                    if let Some(stmt) = self.parse_set(&line) {
                        body.push(stmt);
                    }
                }
                other => {
                    self.error(&line, 1, format!("unexpected statement `{other}`"));
                }
            }
        }
        self.unterminated(header, "method");
        None
    }

    /// `set <field> = <operand> [<op> <operand>]`
    fn parse_set(&mut self, line: &Line) -> Option<SetStmt> {
        let rest = line.after_keyword();
        let (target, expr_text) = match rest.split_once('=') {
            Some((target, expr)) => (target.trim(), expr.trim()),
            None => {
                self.error(line, 1, "set requires `field = expression`");
                return None;
            }
        };

        let tokens: Vec<&str> = expr_text.split_whitespace().collect();
        let expr = match tokens.as_slice() {
            [lhs] => Expr {
                lhs: operand(lhs),
                rest: None,
            },
            [lhs, op, rhs] => {
                let op = match *op {
                    "+" => BinOp::Add,
                    "-" => BinOp::Sub,
                    "*" => BinOp::Mul,
                    other => {
                        self.error(line, 1, format!("unsupported operator `{other}`"));
                        return None;
                    }
                };
                Expr {
                    lhs: operand(lhs),
                    rest: Some((op, operand(rhs))),
                }
            }
            _ => {
                self.error(line, 1, "expression must be `operand` or `operand op operand`");
                return None;
            }
        };

        Some(SetStmt {
            target: target.to_string(),
            expr,
            line: line.number,
            column: line.column_of(target),
        })
    }

    fn parse_type(&mut self, line: &Line, text: &str) -> Option<TypeTag> {
        let ty = match text {
            "bool" => TypeTag::Bool,
            "i8" => TypeTag::I8,
            "i16" => TypeTag::I16,
            "i32" => TypeTag::I32,
            "i64" => TypeTag::I64,
            "u8" => TypeTag::U8,
            "u16" => TypeTag::U16,
            "u32" => TypeTag::U32,
            "u64" => TypeTag::U64,
            "f32" => TypeTag::F32,
            "f64" => TypeTag::F64,
            "str" => TypeTag::Str,
            qualified if qualified.contains('.') => {
                // Qualified names resolve against the module during
                // codegen; enums become Enum, everything else Ref.
                return Some(TypeTag::Ref(qualified.to_string()));
            }
            other => {
                self.diagnostics.push(Diagnostic::error(
                    self.filename,
                    line.number,
                    line.column_of(other),
                    codes::UNKNOWN_TYPE,
                    format!("unknown type `{other}`"),
                ));
                return None;
            }
        };
        Some(ty)
    }

    fn parse_literal(&mut self, line: &Line, ty: &TypeTag, text: &str) -> Option<Value> {
        let value = match ty {
            TypeTag::Bool => text.parse::<bool>().ok().map(Value::Bool),
            TypeTag::I8 => text.parse().ok().map(Value::I8),
            TypeTag::I16 => text.parse().ok().map(Value::I16),
            TypeTag::I32 => text.parse().ok().map(Value::I32),
            TypeTag::I64 => text.parse().ok().map(Value::I64),
            TypeTag::U8 => text.parse().ok().map(Value::U8),
            TypeTag::U16 => text.parse().ok().map(Value::U16),
            TypeTag::U32 => text.parse().ok().map(Value::U32),
            TypeTag::U64 => text.parse().ok().map(Value::U64),
            TypeTag::F32 => text.parse().ok().map(Value::F32),
            TypeTag::F64 => text.parse().ok().map(Value::F64),
            TypeTag::Str => text
                .strip_prefix('"')
                .and_then(|t| t.strip_suffix('"'))
                .map(|t| Value::Str(t.to_string())),
            TypeTag::Enum(_) | TypeTag::Ref(_) => None,
        };
        if value.is_none() {
            self.error(
                line,
                line.column_of(text),
                format!("invalid literal `{text}` for this type"),
            );
        }
        value
    }

    /// Consume lines up to and including the matching `end`
    fn skip_block(&mut self, lines: &mut LineIter) {
        let mut depth = 1usize;
        for line in lines.by_ref() {
            match line.keyword() {
                "end" => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                "method" | "enum" | "class" | "interface" => depth += 1,
                _ => {}
            }
        }
    }

    fn error(&mut self, line: &Line, column: u32, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(
            self.filename,
            line.number,
            column,
            codes::SYNTAX,
            message,
        ));
    }

    fn unterminated(&mut self, header: &Line, what: &str) {
        self.error(header, 1, format!("{what} is missing its `end`"));
    }
}

fn operand(token: &str) -> Operand {
    if let Ok(value) = token.parse::<i64>() {
        return Operand::Literal(Value::I64(value));
    }
    if let Ok(value) = token.parse::<f64>() {
        return Operand::Literal(Value::F64(value));
    }
    if let Some(text) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        return Operand::Literal(Value::Str(text.to_string()));
    }
    Operand::Ident(token.to_string())
}

type LineIter<'a> = std::vec::IntoIter<Line<'a>>;

/// One trimmed source line with its 1-based number
struct Line<'a> {
    number: u32,
    text: &'a str,
    raw: &'a str,
}

impl<'a> Line<'a> {
    fn new(number: u32, raw: &'a str) -> Self {
        Self {
            number,
            text: raw.trim(),
            raw,
        }
    }

    fn is_blank(&self) -> bool {
        self.text.is_empty() || self.text.starts_with('#')
    }

    fn keyword(&self) -> &'a str {
        self.text.split_whitespace().next().unwrap_or_default()
    }

    fn words(&self) -> std::str::SplitWhitespace<'a> {
        self.text.split_whitespace()
    }

    /// Everything after the first `skip` words
    fn rest(&self, skip: usize) -> &'a str {
        let mut remainder = self.text;
        for _ in 0..skip {
            remainder = remainder
                .trim_start()
                .split_once(char::is_whitespace)
                .map(|(_, tail)| tail)
                .unwrap_or("");
        }
        remainder.trim()
    }

    /// Text after the declaration keyword and any modifiers
    fn after_keyword(&self) -> &'a str {
        let mut remainder = self.text;
        loop {
            let (word, tail) = match remainder.split_once(char::is_whitespace) {
                Some(parts) => parts,
                None => return "",
            };
            remainder = tail.trim_start();
            if !matches!(word, "static" | "readonly") {
                return remainder;
            }
        }
    }

    /// 1-based column of a token within the raw line
    fn column_of(&self, token: &str) -> u32 {
        self.raw.find(token).map(|at| at as u32 + 1).unwrap_or(1)
    }
}
