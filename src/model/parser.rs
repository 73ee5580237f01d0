//! Model file parser: splits the file into top-level text and class blocks, then parses each
//! class body statement. Column right-hand sides go through a small expression parser.

use crate::error::AppError;
use crate::model::types::*;
use regex::Regex;
use std::sync::OnceLock;

fn class_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^class\s+([A-Za-z_][A-Za-z0-9_]*)\s*(?:\((.*)\))?\s*:\s*(?:#.*)?$")
            .expect("class header pattern")
    })
}

fn assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*=([^=].*)$").expect("assignment pattern")
    })
}

pub fn parse_model(source: &str) -> Result<ModelFile, AppError> {
    let lines: Vec<&str> = source.lines().collect();
    let mut items = Vec::new();
    let mut text: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if !line.starts_with("class ") && !line.starts_with("class\t") {
            text.push(line);
            i += 1;
            continue;
        }
        flush_text(&mut text, &mut items);

        let caps = class_header_re()
            .captures(line.trim_end())
            .ok_or_else(|| AppError::Parse(format!("line {}: malformed class header", i + 1)))?;
        let header_line = i + 1;
        let class_name = caps[1].to_string();
        let bases = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        i += 1;

        let start = i;
        while i < lines.len() && (lines[i].trim().is_empty() || lines[i].starts_with([' ', '\t'])) {
            i += 1;
        }
        // Trailing blank lines belong to whatever follows the class.
        let mut end = i;
        while end > start && lines[end - 1].trim().is_empty() {
            end -= 1;
        }
        let body = parse_class_body(&lines[start..end], header_line + 1)?;
        items.push(Item::Table(TableDef {
            class_name,
            bases,
            body,
        }));
        i = end;
    }
    flush_text(&mut text, &mut items);

    Ok(ModelFile { items })
}

fn flush_text(text: &mut Vec<&str>, items: &mut Vec<Item>) {
    let start = text.iter().position(|l| !l.trim().is_empty());
    let end = text.iter().rposition(|l| !l.trim().is_empty());
    if let (Some(start), Some(end)) = (start, end) {
        items.push(Item::Text(text[start..=end].join("\n")));
    }
    text.clear();
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Strips the class body indent so the block can be re-indented on render.
fn dedent(lines: &[&str], base: usize) -> String {
    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                ""
            } else {
                l.get(base.min(indent_of(l))..).unwrap_or(l).trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Groups physical lines into logical statements at the body's indent (open brackets and
/// multi-line strings continue a statement). A statement followed by a deeper-indented
/// suite (`def`, nested `class`, `if`) is kept verbatim together with its suite.
fn parse_class_body(lines: &[&str], first_line_no: usize) -> Result<Vec<BodyItem>, AppError> {
    let Some(base) = lines.iter().find(|l| !l.trim().is_empty()).map(|l| indent_of(l)) else {
        return Ok(Vec::new());
    };
    let mut body = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line_no = first_line_no + i;
        if lines[i].trim().is_empty() {
            i += 1;
            continue;
        }
        if indent_of(lines[i]) < base {
            return Err(AppError::Parse(format!(
                "line {}: unindent does not match class body",
                line_no
            )));
        }

        let start = i;
        let mut scan = BracketScan::default();
        let mut code_lines = Vec::new();
        let mut comment: Option<&str>;
        loop {
            let (code, trailing) = scan.feed(lines[i]);
            code_lines.push(code.trim());
            comment = trailing;
            i += 1;
            if (scan.depth <= 0 && scan.in_string.is_none()) || i >= lines.len() {
                break;
            }
        }
        if scan.depth > 0 || scan.in_string.is_some() {
            return Err(AppError::Parse(format!(
                "line {}: unterminated statement in class body",
                line_no
            )));
        }

        let mut suite_end = i;
        let mut j = i;
        while j < lines.len() && (lines[j].trim().is_empty() || indent_of(lines[j]) > base) {
            j += 1;
            if !lines[j - 1].trim().is_empty() {
                suite_end = j;
            }
        }
        if suite_end > i {
            body.push(BodyItem::Raw(dedent(&lines[start..suite_end], base)));
            i = suite_end;
            continue;
        }

        let logical = code_lines.join("\n");
        body.push(parse_statement(
            logical.trim(),
            &lines[start..i],
            comment,
            base,
            line_no,
        )?);
    }
    Ok(body)
}

fn parse_statement(
    logical: &str,
    raw_lines: &[&str],
    comment: Option<&str>,
    base: usize,
    line_no: usize,
) -> Result<BodyItem, AppError> {
    let raw = || BodyItem::Raw(dedent(raw_lines, base));
    let caps = match assignment_re().captures(logical) {
        Some(c) => c,
        None => return Ok(raw()),
    };
    let target = &caps[1];
    let source = caps[2].trim();

    if target == TABLENAME_ATTR {
        return match parse_expr(source) {
            Ok(Expr::Str(name)) => Ok(BodyItem::TableName(name)),
            _ => Err(AppError::Parse(format!(
                "line {}: {} must be a string literal",
                line_no, TABLENAME_ATTR
            ))),
        };
    }
    // Dunder settings such as __table_args__ are not columns.
    if target.starts_with("__") && target.ends_with("__") {
        return Ok(raw());
    }
    let value = match parse_expr(source).ok().or_else(|| parse_call_loosely(source)) {
        Some(value) => value,
        None => {
            tracing::debug!(line = line_no, name = %target, "assignment kept verbatim");
            return Ok(raw());
        }
    };
    Ok(BodyItem::Column(ColumnDef {
        name: target.to_string(),
        value,
        trailing_comment: comment.map(str::to_string),
    }))
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_.]*)\s*\((.*)\)$").expect("call pattern")
    })
}

fn keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^([A-Za-z_][A-Za-z0-9_]*)\s*=([^=].*)$").expect("keyword pattern")
    })
}

/// Fallback for calls whose arguments use syntax the expression parser does not model:
/// each argument is parsed on its own and kept verbatim when that fails.
fn parse_call_loosely(source: &str) -> Option<Expr> {
    let caps = call_re().captures(source)?;
    let mut args = Vec::new();
    let mut keywords = Vec::new();
    for part in split_arguments(&caps[2])? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let parse = |text: &str| parse_expr(text).unwrap_or_else(|_| Expr::Verbatim(text.to_string()));
        match keyword_re().captures(part) {
            Some(kw) => keywords.push(Keyword::new(&kw[1], parse(kw[2].trim()))),
            None => args.push(parse(part)),
        }
    }
    Some(Expr::Call {
        func: Box::new(Expr::name(&caps[1])),
        args,
        keywords,
    })
}

/// Splits an argument list on top-level commas. None when brackets do not balance.
fn split_arguments(source: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in source.char_indices() {
        if let Some(q) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                in_string = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => in_string = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            ',' if depth == 0 => {
                parts.push(&source[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || in_string.is_some() {
        return None;
    }
    parts.push(&source[start..]);
    Some(parts)
}

#[derive(Default)]
struct BracketScan {
    depth: i32,
    in_string: Option<char>,
}

impl BracketScan {
    /// Feeds one physical line; returns its code part and the text after a `#` comment.
    fn feed<'a>(&mut self, line: &'a str) -> (&'a str, Option<&'a str>) {
        let mut chars = line.char_indices();
        while let Some((idx, c)) = chars.next() {
            match self.in_string {
                Some(q) => {
                    if c == '\\' {
                        chars.next();
                    } else if c == q {
                        self.in_string = None;
                    }
                }
                None => match c {
                    '#' => return (&line[..idx], Some(&line[idx + 1..])),
                    '\'' | '"' => self.in_string = Some(c),
                    '(' | '[' | '{' => self.depth += 1,
                    ')' | ']' | '}' => self.depth -= 1,
                    _ => {}
                },
            }
        }
        (line, None)
    }
}

/// Parses the inside of a call's argument list, e.g. `primary_key=True, default='x'`.
pub fn parse_keywords(source: &str) -> Result<Vec<Keyword>, String> {
    let wrapped = format!("f({})", source);
    match parse_expr(&wrapped)? {
        Expr::Call { args, keywords, .. } => match args.first() {
            Some(arg) => Err(format!(
                "attribute '{}' must be written as key=value",
                arg.to_source()
            )),
            None => Ok(keywords),
        },
        _ => Err(format!("invalid attributes: {}", source)),
    }
}

pub fn parse_expr(source: &str) -> Result<Expr, String> {
    let tokens = tokenize(source)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(format!("unexpected {:?} after expression", tok)),
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Equals,
    Dot,
    Minus,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '\'' | '"' => {
                let (s, next) = read_string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

fn read_string(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                let escaped = chars.get(i + 1).ok_or("unterminated string literal")?;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err("unterminated string literal".into())
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok == want => Ok(()),
            Some(tok) => Err(format!("expected {:?}, found {:?}", want, tok)),
            None => Err(format!("expected {:?}, found end of input", want)),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.expr()?)));
        }
        let mut expr = self.atom()?;
        while self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let (args, keywords) = self.arguments()?;
            expr = Expr::Call {
                func: Box::new(expr),
                args,
                keywords,
            };
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Ident(first)) => {
                let mut name = first;
                while self.peek() == Some(&Token::Dot) {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(part)) => {
                            name.push('.');
                            name.push_str(&part);
                        }
                        _ => return Err("expected name after '.'".into()),
                    }
                }
                Ok(Expr::Name(name))
            }
            Some(Token::Str(first)) => {
                let mut s = first;
                while let Some(Token::Str(more)) = self.peek().cloned() {
                    self.pos += 1;
                    s.push_str(&more);
                }
                Ok(Expr::Str(s))
            }
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LBracket) => {
                let items = self.sequence(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(Token::LParen) => {
                let first = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(first),
                    Some(Token::Comma) => {
                        let mut items = vec![first];
                        items.extend(self.sequence(Token::RParen)?);
                        Ok(Expr::Tuple(items))
                    }
                    _ => Err("expected ')' or ','".into()),
                }
            }
            Some(tok) => Err(format!("unexpected {:?}", tok)),
            None => Err("unexpected end of input".into()),
        }
    }

    fn sequence(&mut self, close: Token) -> Result<Vec<Expr>, String> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => {}
                Some(tok) if tok == close => return Ok(items),
                _ => return Err(format!("expected ',' or {:?}", close)),
            }
        }
    }

    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<Keyword>), String> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
                return Ok((args, keywords));
            }
            let is_keyword = matches!(
                (self.peek(), self.peek_at(1)),
                (Some(Token::Ident(_)), Some(Token::Equals))
            );
            if is_keyword {
                let arg = match self.next() {
                    Some(Token::Ident(arg)) => arg,
                    _ => unreachable!("keyword name checked above"),
                };
                self.expect(Token::Equals)?;
                let value = self.expr()?;
                keywords.push(Keyword { arg, value });
            } else if keywords.is_empty() {
                args.push(self.expr()?);
            } else {
                return Err("positional argument follows keyword argument".into());
            }
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => return Ok((args, keywords)),
                Some(tok) => return Err(format!("expected ',' or ')', found {:?}", tok)),
                None => return Err("unclosed '('".into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
from sqlalchemy import create_engine
from sqlalchemy.ext.declarative import declarative_base

Base = declarative_base()


class Users(Base):
    __tablename__ = 'users'
    id = Column(Integer, primary_key=True)
    email = Column(String(120), nullable=False, unique=True)
    # contact details
    team_id = Column(
        Integer,
        ForeignKey('teams.id'),
        server_default=text(\"0\"),
    )


class Teams(Base):
    __tablename__ = \"teams\"
    id = Column(Integer, primary_key=True)
    score = Float(precision=-1)
    nickname = 'n/a'
";

    #[test]
    fn parses_preamble_and_tables() {
        let model = parse_model(SAMPLE).unwrap();
        assert_eq!(model.items.len(), 3);
        match &model.items[0] {
            Item::Text(t) => assert!(t.starts_with("from sqlalchemy") && t.ends_with("declarative_base()")),
            other => panic!("expected preamble, got {:?}", other),
        }
        let users = model.table("Users").unwrap();
        assert_eq!(users.table_name(), Some("users"));
        assert_eq!(users.columns().count(), 3);
        assert!(users.column("id").unwrap().is_primary_key());
        assert!(users
            .body
            .iter()
            .any(|b| matches!(b, BodyItem::Raw(r) if r.trim() == "# contact details")));
    }

    #[test]
    fn inventory_follows_column_rules() {
        let model = parse_model(SAMPLE).unwrap();
        let inv = model.inventory();
        assert_eq!(inv[0].table_name, "users");
        let email = &inv[0].columns[1];
        assert_eq!(email.column_type, "String");
        assert_eq!(email.attributes, "nullable=False, unique=True");
        let team = &inv[0].columns[2];
        assert_eq!(team.column_type, "Integer");
        assert_eq!(
            team.attributes,
            "server_default=Call(func=Name(id='text'), args=[Constant(value='0')], keywords=[])"
        );
        let teams = &inv[1];
        assert_eq!(teams.columns[1].column_type, "Float");
        assert_eq!(
            teams.columns[1].attributes,
            "precision=UnaryOp(op=USub(), operand=Constant(value=1))"
        );
        assert_eq!(teams.columns[2].column_type, UNKNOWN_TYPE);
        assert_eq!(teams.columns[2].attributes, "");
    }

    #[test]
    fn method_bodies_are_not_columns() {
        let model = parse_model(
            "class Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n\n    def label(self):\n        name = self.id\n        return name\n",
        )
        .unwrap();
        let inv = model.inventory();
        assert_eq!(inv[0].columns.len(), 1);
        assert_eq!(inv[0].columns[0].name, "id");
        let users = model.table("Users").unwrap();
        assert!(users.body.iter().any(|b| matches!(
            b,
            BodyItem::Raw(r) if r == "def label(self):\n    name = self.id\n    return name"
        )));
    }

    #[test]
    fn unmodelled_syntax_is_kept_verbatim() {
        let model = parse_model(
            "class Users(Base):\n    __tablename__ = 'users'\n    __table_args__ = {'extend_existing': True}\n    id = Column(Integer, primary_key=True)\n    token = Column(String(32), default=lambda: uuid4().hex, nullable=False)\n    settings = {'a': 1}\n    \"\"\"Users of the\n    system.\"\"\"\n",
        )
        .unwrap();
        let users = model.table("Users").unwrap();
        let token = users.column("token").unwrap();
        assert_eq!(token.type_name(), "String");
        assert_eq!(
            token.keyword("default"),
            Some(&Expr::Verbatim("lambda: uuid4().hex".into()))
        );
        assert_eq!(
            token.to_source(),
            "token = Column(String(32), default=lambda: uuid4().hex, nullable=False)"
        );
        assert!(users.column("settings").is_none());
        assert_eq!(users.columns().count(), 2);
    }

    #[test]
    fn trailing_comments_stay_with_their_column() {
        let model = parse_model(
            "class A(Base):\n    __tablename__ = 'a'\n    id = Column(Integer, primary_key=True)  # pk, 'quoted'\n    tag = Column(String(8), default='#x')\n",
        )
        .unwrap();
        let a = model.table("A").unwrap();
        assert_eq!(a.column("id").unwrap().trailing_comment.as_deref(), Some(" pk, 'quoted'"));
        let tag = a.column("tag").unwrap();
        assert_eq!(tag.trailing_comment, None);
        assert_eq!(tag.keyword("default"), Some(&Expr::Str("#x".into())));
    }

    #[test]
    fn rejects_malformed_class_header() {
        let err = parse_model("class Broken(Base)\n    id = Column(Integer)\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(ref m) if m.contains("line 1")));
    }

    #[test]
    fn rejects_unterminated_statement() {
        let err = parse_model("class A(Base):\n    id = Column(Integer,\n").unwrap_err();
        assert!(matches!(err, AppError::Parse(_)));
    }

    #[test]
    fn keywords_from_attribute_text() {
        let kws = parse_keywords("primary_key=True, default='a, b', ").unwrap();
        assert_eq!(kws.len(), 2);
        assert_eq!(kws[1].value, Expr::Str("a, b".into()));
        assert!(parse_keywords("").unwrap().is_empty());
        assert!(parse_keywords("nullable").is_err());
        assert!(parse_keywords("comment=two words").is_err());
    }
}
