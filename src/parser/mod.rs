//! # Policy Parser
//!
//! Hand-written recursive-descent parser for Warden policy modules: package
//! declarations, imports, rules (with `default` and `else`), bodies,
//! references, comprehensions, calls, `some` declarations, and `with`
//! modifiers.
//!
//! The parser produces the raw AST consumed by the compiler. It performs no
//! name resolution or rewriting; its only semantic check is that import
//! paths are rooted at `input` or `data`.

use crate::ast::{
    operator_ref, Body, Expr, ExprTerms, Head, Import, Module, Package, Rule, SomeDecl, Term, With,
};
use crate::errors::{Error, ErrorKind, Errors};
use crate::location::Location;
use crate::value::{
    Array, ArrayComprehension, Call, Number, Object, ObjectComprehension, Ref, Set,
    SetComprehension, Value, Var,
};

mod lexer;

pub use lexer::{tokenize, LexError, Token, TokenKind};

/// Keywords that cannot be used as variable names.
const KEYWORDS: [&str; 12] = [
    "package", "import", "as", "default", "else", "not", "some", "in", "with", "null", "true",
    "false",
];

/// Parse a single module from source text.
pub fn parse_module(file: &str, src: &str) -> Result<Module, Errors> {
    let mut parser = Parser::new(file, src)?;
    let module = parser.module().map_err(Errors::from)?;
    Ok(module)
}

/// Parse a query body from source text.
pub fn parse_body(file: &str, src: &str) -> Result<Body, Errors> {
    let mut parser = Parser::new(file, src)?;
    let body = parser.body_until(&TokenKind::Eof).map_err(Errors::from)?;
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(file: &str, src: &str) -> Result<Self, Errors> {
        let tokens = tokenize(file, src).map_err(|e| {
            Errors::from(Error::new(ErrorKind::Parse, Some(e.location.clone()), e.message))
        })?;
        Ok(Parser { tokens, pos: 0 })
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if matches!(self.peek_kind(), TokenKind::Ident(s) if s == word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_ident(&self, word: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(s) if s == word)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, Error> {
        if self.peek_kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected `{kind}` but found `{}`",
                self.peek_kind()
            )))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Location), Error> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let tok = self.advance();
                Ok((name, tok.location))
            }
            other => Err(self.error(format!("expected identifier but found `{other}`"))),
        }
    }

    fn expect_var(&mut self) -> Result<(String, Location), Error> {
        let (name, loc) = self.expect_ident()?;
        if KEYWORDS.contains(&name.as_str()) {
            return Err(Error::new(
                ErrorKind::Parse,
                Some(loc),
                format!("unexpected keyword `{name}`"),
            ));
        }
        Ok((name, loc))
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::new(
            ErrorKind::Parse,
            Some(self.peek().location.clone()),
            message,
        )
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    fn module(&mut self) -> Result<Module, Error> {
        let package = self.package()?;
        let mut module = Module::new(package);

        while self.at_ident("import") {
            module.imports.push(self.import()?);
        }

        while !matches!(self.peek_kind(), TokenKind::Eof) {
            module.rules.push(self.rule()?);
        }
        Ok(module)
    }

    fn package(&mut self) -> Result<Package, Error> {
        if !self.eat_ident("package") {
            return Err(self.error("expected `package` declaration"));
        }
        let start = self.peek().location.clone();
        let mut terms = vec![Term::new(
            Value::Var(Var::new("data")),
            start.clone(),
        )];
        loop {
            let (seg, loc) = self.expect_var()?;
            terms.push(Term::new(Value::String(seg), loc));
            if !self.eat(&TokenKind::Dot) {
                break;
            }
        }
        Ok(Package {
            path: Ref::new(terms),
            location: start.into(),
        })
    }

    fn import(&mut self) -> Result<Import, Error> {
        self.advance(); // `import`
        let start = self.peek().location.clone();
        let path = self.postfix_term()?;
        let path = match path.value {
            Value::Ref(_) => path,
            Value::Var(v) => Term::new(
                Value::Ref(Ref::from_var(v)),
                path.location.get(),
            ),
            _ => {
                return Err(Error::new(
                    ErrorKind::Parse,
                    Some(start),
                    "unexpected import path, must begin with input or data",
                ))
            }
        };
        let rooted = path
            .value
            .as_ref_value()
            .and_then(|r| r.head_var())
            .is_some_and(|v| v.as_str() == "input" || v.as_str() == "data");
        if !rooted {
            return Err(Error::new(
                ErrorKind::Parse,
                Some(start),
                "unexpected import path, must begin with input or data",
            ));
        }
        let alias = if self.eat_ident("as") {
            let (name, _) = self.expect_var()?;
            Some(Var::new(name))
        } else {
            None
        };
        Ok(Import {
            location: path.location.clone(),
            path,
            alias,
        })
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    fn rule(&mut self) -> Result<Rule, Error> {
        if self.at_ident("default") {
            return self.default_rule();
        }

        let (name, name_loc) = self.expect_var()?;
        let mut head = Head::new(name);
        head.location = name_loc.clone().into();

        match self.peek_kind() {
            TokenKind::LParen => {
                self.advance();
                if !self.eat(&TokenKind::RParen) {
                    loop {
                        head.args.push(self.arith_term()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                }
                head.value = Some(Term::truth());
            }
            TokenKind::LBracket => {
                self.advance();
                head.key = Some(self.arith_term()?);
                head.value = None;
                self.expect(&TokenKind::RBracket)?;
            }
            _ => {}
        }

        match self.peek_kind() {
            TokenKind::Unify => {
                self.advance();
                head.value = Some(self.arith_term()?);
            }
            TokenKind::Assign => {
                self.advance();
                head.assign = true;
                head.value = Some(self.arith_term()?);
            }
            _ => {}
        }

        let body = if self.eat(&TokenKind::LBrace) {
            let body = self.body_until(&TokenKind::RBrace)?;
            self.expect(&TokenKind::RBrace)?;
            body
        } else {
            Body::from_exprs(vec![Expr::truth()])
        };

        let mut rule = Rule::new(head, body);
        rule.location = name_loc.into();

        if self.at_ident("else") {
            if rule.head.key.is_some() {
                return Err(self.error("else keyword cannot be used on partial rules"));
            }
            rule.else_rule = Some(Box::new(self.else_rule(&rule)?));
        }
        Ok(rule)
    }

    fn else_rule(&mut self, prev: &Rule) -> Result<Rule, Error> {
        let else_loc = self.peek().location.clone();
        self.advance(); // `else`

        let mut head = Head {
            name: prev.head.name.clone(),
            args: prev.head.args.clone(),
            key: None,
            value: Some(Term::truth()),
            assign: false,
            location: else_loc.clone().into(),
        };
        match self.peek_kind() {
            TokenKind::Unify => {
                self.advance();
                head.value = Some(self.arith_term()?);
            }
            TokenKind::Assign => {
                self.advance();
                head.assign = true;
                head.value = Some(self.arith_term()?);
            }
            _ => {}
        }

        let body = if self.eat(&TokenKind::LBrace) {
            let body = self.body_until(&TokenKind::RBrace)?;
            self.expect(&TokenKind::RBrace)?;
            body
        } else {
            Body::from_exprs(vec![Expr::truth()])
        };

        let mut rule = Rule::new(head, body);
        rule.location = else_loc.into();
        if self.at_ident("else") {
            rule.else_rule = Some(Box::new(self.else_rule(&rule)?));
        }
        Ok(rule)
    }

    fn default_rule(&mut self) -> Result<Rule, Error> {
        let start = self.peek().location.clone();
        self.advance(); // `default`
        let (name, name_loc) = self.expect_var()?;
        let mut head = Head::new(name);
        head.location = name_loc.into();
        match self.peek_kind() {
            TokenKind::Unify => {
                self.advance();
            }
            TokenKind::Assign => {
                self.advance();
                head.assign = true;
            }
            other => {
                return Err(self.error(format!(
                    "expected `=` or `:=` after default rule name but found `{other}`"
                )))
            }
        }
        head.value = Some(self.arith_term()?);

        let mut rule = Rule::new(head, Body::from_exprs(vec![Expr::truth()]));
        rule.default = true;
        rule.location = start.into();
        Ok(rule)
    }

    // ------------------------------------------------------------------
    // Bodies and expressions
    // ------------------------------------------------------------------

    fn body_until(&mut self, end: &TokenKind) -> Result<Body, Error> {
        let mut body = Body::new();
        loop {
            body.push(self.expr()?);
            if self.eat(&TokenKind::Semicolon) {
                if self.peek_kind() == end {
                    break;
                }
                continue;
            }
            if self.peek_kind() == end {
                break;
            }
            if self.peek().newline_before {
                continue;
            }
            return Err(self.error(format!(
                "expected `;` or newline before `{}`",
                self.peek_kind()
            )));
        }
        Ok(body)
    }

    fn expr(&mut self) -> Result<Expr, Error> {
        let start = self.peek().location.clone();

        if self.at_ident("some") {
            return self.some_decl(start);
        }

        let negated = self.eat_ident("not");

        let left = self.arith_term()?;
        let op = match self.peek_kind() {
            TokenKind::Unify => Some("eq"),
            TokenKind::Equal => Some("equal"),
            TokenKind::Assign => Some("assign"),
            TokenKind::Neq => Some("neq"),
            TokenKind::Lt => Some("lt"),
            TokenKind::Lte => Some("lte"),
            TokenKind::Gt => Some("gt"),
            TokenKind::Gte => Some("gte"),
            _ => None,
        };

        let mut expr = if let Some(op) = op {
            let op_tok = self.advance();
            let right = self.arith_term()?;
            Expr::new_call(vec![
                Term::new(Value::Ref(operator_ref(op)), op_tok.location),
                left,
                right,
            ])
        } else if let Value::Call(call) = left.value {
            // A bare call is an expression in call form.
            let mut e = Expr::new_call(call.0);
            e.location = left.location;
            e
        } else {
            Expr::new_term(left)
        };

        expr.negated = negated;
        expr.location = start.into();

        while self.at_ident("with") {
            let with_loc = self.peek().location.clone();
            self.advance();
            let target = self.postfix_term()?;
            if !self.eat_ident("as") {
                return Err(self.error("expected `as` in with modifier"));
            }
            let value = self.arith_term()?;
            expr.with.push(With {
                target,
                value,
                location: with_loc.into(),
            });
        }
        Ok(expr)
    }

    fn some_decl(&mut self, start: Location) -> Result<Expr, Error> {
        self.advance(); // `some`
        let mut vars = Vec::new();
        loop {
            let (name, loc) = self.expect_var()?;
            vars.push(Term::new(Value::Var(Var::new(name)), loc));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let symbols = if self.eat_ident("in") {
            let collection = self.arith_term()?;
            let (op, mut terms) = match vars.len() {
                1 => ("internal.member_2", vars),
                2 => ("internal.member_3", vars),
                _ => {
                    return Err(Error::new(
                        ErrorKind::Parse,
                        Some(start),
                        "expected one or two variables before `in`",
                    ))
                }
            };
            terms.push(collection);
            let mut call_terms = vec![Term::from(Value::Ref(operator_ref(op)))];
            call_terms.append(&mut terms);
            vec![Term::from(Value::Call(Call::new(call_terms)))]
        } else {
            vars
        };

        let mut expr = Expr::new_some(SomeDecl { symbols });
        expr.location = start.into();
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Terms
    // ------------------------------------------------------------------

    /// Additive-precedence term: the general term form used in bodies,
    /// heads, and call arguments.
    fn arith_term(&mut self) -> Result<Term, Error> {
        let mut left = self.mul_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Add => "plus",
                TokenKind::Sub => "minus",
                _ => break,
            };
            let op_tok = self.advance();
            let right = self.mul_term()?;
            left = binary_call(op, op_tok.location, left, right);
        }
        Ok(left)
    }

    fn mul_term(&mut self) -> Result<Term, Error> {
        let mut left = self.unary_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => "mul",
                TokenKind::Slash => "div",
                TokenKind::Percent => "rem",
                _ => break,
            };
            let op_tok = self.advance();
            let right = self.unary_term()?;
            left = binary_call(op, op_tok.location, left, right);
        }
        Ok(left)
    }

    fn unary_term(&mut self) -> Result<Term, Error> {
        if self.peek_kind() == &TokenKind::Sub {
            let minus = self.advance();
            let operand = self.unary_term()?;
            return match &operand.value {
                Value::Number(n) => {
                    let negated: Number = format!("-{}", n.as_str()).parse().map_err(|_| {
                        Error::new(
                            ErrorKind::Parse,
                            Some(minus.location.clone()),
                            "malformed number",
                        )
                    })?;
                    Ok(Term::new(Value::Number(negated), minus.location))
                }
                _ => Err(Error::new(
                    ErrorKind::Parse,
                    Some(minus.location),
                    "unary minus requires a number",
                )),
            };
        }
        self.postfix_term()
    }

    /// Primary term followed by `.field`, `[index]`, and call suffixes.
    fn postfix_term(&mut self) -> Result<Term, Error> {
        let mut term = self.primary_term()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    let base = into_ref_base(term).map_err(|t| {
                        Error::new(
                            ErrorKind::Parse,
                            t.location.get(),
                            format!("unexpected `.` after {}", t.value.type_name()),
                        )
                    })?;
                    self.advance();
                    let (field, loc) = self.expect_var()?;
                    let appended = base.append(Term::new(Value::String(field), loc));
                    term = Term::new(Value::Ref(appended), term_ref_location(&base));
                }
                TokenKind::LBracket => {
                    let base = match into_ref_base(term) {
                        Ok(base) => base,
                        // `[` after a non-ref term starts a new statement
                        // context; let the caller handle it.
                        Err(t) => {
                            term = t;
                            break;
                        }
                    };
                    self.advance();
                    let index = self.arith_term()?;
                    self.expect(&TokenKind::RBracket)?;
                    let appended = base.append(index);
                    term = Term::new(Value::Ref(appended), term_ref_location(&base));
                }
                TokenKind::LParen => {
                    let operator = match &term.value {
                        Value::Var(_) | Value::Ref(_) => {
                            into_ref_base(term.clone()).map_err(|_| {
                                self.error("expected function name before `(`")
                            })?
                        }
                        _ => break,
                    };
                    self.advance();
                    let mut call_terms =
                        vec![Term::new(Value::Ref(operator), term.location.get())];
                    if !self.eat(&TokenKind::RParen) {
                        loop {
                            call_terms.push(self.arith_term()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                        self.expect(&TokenKind::RParen)?;
                    }
                    term = Term::new(Value::Call(Call::new(call_terms)), term.location.get());
                    // Calls are not subscriptable.
                    break;
                }
                _ => break,
            }
        }
        Ok(term)
    }

    fn primary_term(&mut self) -> Result<Term, Error> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Number(repr) => {
                self.advance();
                let n: Number = repr.parse().map_err(|_| {
                    Error::new(ErrorKind::Parse, Some(tok.location.clone()), "malformed number")
                })?;
                Ok(Term::new(Value::Number(n), tok.location))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Term::new(Value::String(s.clone()), tok.location))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "null" => {
                    self.advance();
                    Ok(Term::new(Value::Null, tok.location))
                }
                "true" => {
                    self.advance();
                    Ok(Term::new(Value::Boolean(true), tok.location))
                }
                "false" => {
                    self.advance();
                    Ok(Term::new(Value::Boolean(false), tok.location))
                }
                "set" if self.set_constructor_ahead() => {
                    self.advance();
                    self.advance(); // `(`
                    self.expect(&TokenKind::RParen)?;
                    Ok(Term::new(Value::Set(Set::new()), tok.location))
                }
                name if KEYWORDS.contains(&name) => {
                    Err(self.error(format!("unexpected keyword `{name}`")))
                }
                name => {
                    let var = Var::new(name);
                    self.advance();
                    Ok(Term::new(Value::Var(var), tok.location))
                }
            },
            TokenKind::LBracket => self.array_or_comprehension(tok.location),
            TokenKind::LBrace => self.brace_term(tok.location),
            TokenKind::LParen => {
                self.advance();
                let term = self.paren_term()?;
                self.expect(&TokenKind::RParen)?;
                Ok(term)
            }
            other => Err(self.error(format!("unexpected token `{other}`"))),
        }
    }

    fn set_constructor_ahead(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::LParen)
        ) && matches!(
            self.tokens.get(self.pos + 2).map(|t| &t.kind),
            Some(TokenKind::RParen)
        )
    }

    /// Inside parentheses, comparisons are allowed as boolean-valued call
    /// terms.
    fn paren_term(&mut self) -> Result<Term, Error> {
        let left = self.arith_term()?;
        let op = match self.peek_kind() {
            TokenKind::Equal => Some("equal"),
            TokenKind::Neq => Some("neq"),
            TokenKind::Lt => Some("lt"),
            TokenKind::Lte => Some("lte"),
            TokenKind::Gt => Some("gt"),
            TokenKind::Gte => Some("gte"),
            _ => None,
        };
        match op {
            Some(op) => {
                let op_tok = self.advance();
                let right = self.arith_term()?;
                Ok(binary_call(op, op_tok.location, left, right))
            }
            None => Ok(left),
        }
    }

    fn array_or_comprehension(&mut self, start: Location) -> Result<Term, Error> {
        self.advance(); // `[`
        if self.eat(&TokenKind::RBracket) {
            return Ok(Term::new(Value::Array(Array::new(Vec::new())), start));
        }
        let first = self.arith_term()?;
        if self.eat(&TokenKind::Pipe) {
            let body = self.body_until(&TokenKind::RBracket)?;
            self.expect(&TokenKind::RBracket)?;
            return Ok(Term::new(
                Value::ArrayComprehension(ArrayComprehension {
                    term: Box::new(first),
                    body,
                }),
                start,
            ));
        }
        let mut elems = vec![first];
        while self.eat(&TokenKind::Comma) {
            elems.push(self.arith_term()?);
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Term::new(Value::Array(Array::new(elems)), start))
    }

    fn brace_term(&mut self, start: Location) -> Result<Term, Error> {
        self.advance(); // `{`
        if self.eat(&TokenKind::RBrace) {
            return Ok(Term::new(Value::Object(Object::new()), start));
        }
        let first = self.arith_term()?;
        if self.eat(&TokenKind::Colon) {
            let value = self.arith_term()?;
            if self.eat(&TokenKind::Pipe) {
                let body = self.body_until(&TokenKind::RBrace)?;
                self.expect(&TokenKind::RBrace)?;
                return Ok(Term::new(
                    Value::ObjectComprehension(ObjectComprehension {
                        key: Box::new(first),
                        value: Box::new(value),
                        body,
                    }),
                    start,
                ));
            }
            let mut pairs = vec![(first, value)];
            while self.eat(&TokenKind::Comma) {
                let k = self.arith_term()?;
                self.expect(&TokenKind::Colon)?;
                let v = self.arith_term()?;
                pairs.push((k, v));
            }
            self.expect(&TokenKind::RBrace)?;
            return Ok(Term::new(Value::Object(Object::from_pairs(pairs)), start));
        }
        if self.eat(&TokenKind::Pipe) {
            let body = self.body_until(&TokenKind::RBrace)?;
            self.expect(&TokenKind::RBrace)?;
            return Ok(Term::new(
                Value::SetComprehension(SetComprehension {
                    term: Box::new(first),
                    body,
                }),
                start,
            ));
        }
        let mut elems = vec![first];
        while self.eat(&TokenKind::Comma) {
            elems.push(self.arith_term()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Term::new(Value::Set(Set::from_elems(elems)), start))
    }
}

fn binary_call(op: &str, op_loc: Location, left: Term, right: Term) -> Term {
    let location = left.location.get();
    Term::new(
        Value::Call(Call::new(vec![
            Term::new(Value::Ref(operator_ref(op)), op_loc),
            left,
            right,
        ])),
        location,
    )
}

/// Convert a term into a reference base for postfix extension. Variables
/// become single-element references.
fn into_ref_base(term: Term) -> Result<Ref, Term> {
    match term.value {
        Value::Ref(r) => Ok(r),
        Value::Var(_) => {
            let location = term.location.clone();
            Ok(Ref::new(vec![Term {
                value: term.value,
                location,
            }]))
        }
        _ => Err(term),
    }
}

fn term_ref_location(base: &Ref) -> Option<Location> {
    base.head().and_then(|t| t.location.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RuleKind;

    fn module(src: &str) -> Module {
        parse_module("test.warden", src).expect("parse module")
    }

    fn body(src: &str) -> Body {
        parse_body("test.warden", src).expect("parse body")
    }

    #[test]
    fn test_parse_package_and_import() {
        let m = module("package a.b\nimport data.foo.bar as baz\np = 1");
        assert_eq!(m.package.path.to_string(), "data.a.b");
        assert_eq!(m.imports.len(), 1);
        assert_eq!(m.imports[0].name(), Some(Var::new("baz")));
        assert_eq!(m.rules.len(), 1);
    }

    #[test]
    fn test_parse_rule_kinds() {
        let m = module(
            "package t\n\
             a = 1\n\
             b[x] { x = 1 }\n\
             c[x] = y { x = \"k\"; y = 1 }\n\
             d(x) = y { y = x }",
        );
        let kinds: Vec<RuleKind> = m.rules.iter().map(|r| r.head.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                RuleKind::CompleteDoc,
                RuleKind::PartialSet,
                RuleKind::PartialObject,
                RuleKind::Function,
            ]
        );
    }

    #[test]
    fn test_parse_default_rule() {
        let m = module("package t\ndefault allow = false");
        assert!(m.rules[0].default);
        assert_eq!(
            m.rules[0].head.value.as_ref().map(|t| &t.value),
            Some(&Value::Boolean(false))
        );
        assert!(m.rules[0].body.0[0].is_trivially_true());
    }

    #[test]
    fn test_parse_else_chain() {
        let m = module("package t\np = 1 { q } else = 2 { r } else = 3");
        let rule = &m.rules[0];
        let chain = rule.chain();
        assert_eq!(chain.len(), 3);
        assert_eq!(
            chain[2].head.value.as_ref().map(|t| t.value.clone()),
            Some(Value::from(3))
        );
    }

    #[test]
    fn test_parse_refs() {
        let b = body("data.foo.bar[_] = x");
        let expr = &b.0[0];
        assert!(expr.is_equality());
        let lhs = &expr.operands()[0];
        assert_eq!(lhs.value.to_string(), "data.foo.bar[_]");
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        let b = body("x = 1 + 2 * 3");
        let rhs = &b.0[0].operands()[1];
        // plus(1, mul(2, 3))
        match &rhs.value {
            Value::Call(call) => {
                assert_eq!(crate::ast::operator_name(call.operator().expect("op")), Some("plus".to_string()));
                match &call.args()[1].value {
                    Value::Call(inner) => {
                        assert_eq!(
                            crate::ast::operator_name(inner.operator().expect("op")),
                            Some("mul".to_string())
                        );
                    }
                    other => panic!("expected nested call, got {other:?}"),
                }
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_comprehensions() {
        let b = body("xs = [x | x = 1]; ys = {y | y = 2}; zs = {k: v | k = \"a\"; v = 1}");
        assert!(matches!(
            b.0[0].operands()[1].value,
            Value::ArrayComprehension(_)
        ));
        assert!(matches!(
            b.0[1].operands()[1].value,
            Value::SetComprehension(_)
        ));
        assert!(matches!(
            b.0[2].operands()[1].value,
            Value::ObjectComprehension(_)
        ));
    }

    #[test]
    fn test_parse_some_declarations() {
        let b = body("some x, y");
        match &b.0[0].terms {
            ExprTerms::SomeDecl(decl) => assert_eq!(decl.symbols.len(), 2),
            other => panic!("expected some decl, got {other:?}"),
        }

        let b = body("some k, v in xs");
        match &b.0[0].terms {
            ExprTerms::SomeDecl(decl) => {
                assert_eq!(decl.symbols.len(), 1);
                match &decl.symbols[0].value {
                    Value::Call(call) => {
                        assert_eq!(call.args().len(), 3);
                    }
                    other => panic!("expected member call, got {other:?}"),
                }
            }
            other => panic!("expected some decl, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_with_modifiers() {
        let b = body("allow with input.user as \"admin\" with data.roles as [\"a\"]");
        let expr = &b.0[0];
        assert_eq!(expr.with.len(), 2);
        assert_eq!(expr.with[0].target.value.to_string(), "input.user");
    }

    #[test]
    fn test_parse_negation() {
        let b = body("not p[x]");
        assert!(b.0[0].negated);
    }

    #[test]
    fn test_parse_bare_call_becomes_call_expr() {
        let b = body("count(xs, n)");
        let expr = &b.0[0];
        assert!(expr.is_call());
        assert_eq!(expr.operator_name().as_deref(), Some("count"));
    }

    #[test]
    fn test_parse_empty_set_constructor() {
        let b = body("x = set()");
        assert_eq!(b.0[0].operands()[1].value, Value::Set(Set::new()));
    }

    #[test]
    fn test_import_must_be_rooted() {
        let err = parse_module("t", "package t\nimport foo.bar").expect_err("must fail");
        assert!(err
            .to_string()
            .contains("must begin with input or data"));
    }

    #[test]
    fn test_newline_separates_exprs() {
        let b = body("x = 1\ny = 2");
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn test_missing_separator_is_error() {
        assert!(parse_body("t", "x = 1 y = 2").is_err());
    }

    #[test]
    fn test_rule_body_locations() {
        let m = module("package t\np { not a[i] = x }");
        let expr = &m.rules[0].body.0[0];
        let loc = expr.location.get().expect("location");
        assert_eq!(loc.row, 2);
    }

    #[test]
    fn test_wildcards_parse_as_underscore_var() {
        let b = body("a[_]");
        match &b.0[0].terms {
            ExprTerms::Term(t) => {
                let r = t.value.as_ref_value().expect("ref");
                assert_eq!(r.operands()[0].value, Value::Var(Var::new("_")));
            }
            other => panic!("expected term, got {other:?}"),
        }
    }
}
