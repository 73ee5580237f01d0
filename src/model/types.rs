//! Structured view of the model file: verbatim text blocks and table declarations whose
//! column right-hand sides are parsed expressions.

use serde::Serialize;
use std::fmt;

/// Column types accepted from callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Integer,
    String,
    Float,
    Boolean,
    Date,
    Text,
}

impl ColumnType {
    pub const ALL: [ColumnType; 6] = [
        ColumnType::Integer,
        ColumnType::String,
        ColumnType::Float,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "Integer",
            ColumnType::String => "String",
            ColumnType::Float => "Float",
            ColumnType::Boolean => "Boolean",
            ColumnType::Date => "Date",
            ColumnType::Text => "Text",
        }
    }

    /// Exact (case-sensitive) lookup by constructor name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated column for a new table or an added column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    /// Normalized `key=value, key=value` text; empty when the column has no attributes.
    pub attributes: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSpec {
    /// Class name (capitalized); the table name is its lowercase form.
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColumnEdit {
    pub name: String,
    pub new_name: Option<String>,
    pub new_type: Option<ColumnType>,
    pub new_attributes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EditSpec {
    pub table_name: String,
    pub add_columns: Vec<ColumnSpec>,
    pub delete_columns: Vec<String>,
    pub edit_columns: Vec<ColumnEdit>,
}

/// Right-hand side of a declaration, e.g. `Column(String(50), nullable=False)`.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Identifier, possibly dotted (`sa.Integer`). `True`, `False`, `None` are names too.
    Name(String),
    /// String literal content, unescaped.
    Str(String),
    /// Numeric literal as written.
    Number(String),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Neg(Box<Expr>),
    /// Source text the expression parser does not model (`lambda: ...`, `{...}`), kept as
    /// written.
    Verbatim(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    pub arg: String,
    pub value: Expr,
}

impl Keyword {
    pub fn new(arg: impl Into<String>, value: Expr) -> Self {
        Self {
            arg: arg.into(),
            value,
        }
    }
}

impl Expr {
    pub fn name(s: impl Into<String>) -> Self {
        Expr::Name(s.into())
    }

    /// Last segment of a name, or of a call's callee.
    pub fn callee_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => n.rsplit('.').next(),
            Expr::Call { func, .. } => func.callee_name(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Name(n) if n == "True" => Some(true),
            Expr::Name(n) if n == "False" => Some(false),
            _ => None,
        }
    }

    pub fn as_str_literal(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Source text, as written back to the model file.
    pub fn to_source(&self) -> String {
        match self {
            Expr::Name(n) => n.clone(),
            Expr::Str(s) => quote_literal(s),
            Expr::Number(n) => n.clone(),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                let parts: Vec<String> = args
                    .iter()
                    .map(Expr::to_source)
                    .chain(
                        keywords
                            .iter()
                            .map(|k| format!("{}={}", k.arg, k.value.to_source())),
                    )
                    .collect();
                format!("{}({})", func.to_source(), parts.join(", "))
            }
            Expr::List(items) => format!(
                "[{}]",
                items.iter().map(Expr::to_source).collect::<Vec<_>>().join(", ")
            ),
            Expr::Tuple(items) if items.len() == 1 => format!("({},)", items[0].to_source()),
            Expr::Tuple(items) => format!(
                "({})",
                items.iter().map(Expr::to_source).collect::<Vec<_>>().join(", ")
            ),
            Expr::Neg(inner) => format!("-{}", inner.to_source()),
            Expr::Verbatim(text) => text.clone(),
        }
    }

    /// Value as shown in the inventory: literal content for strings, numbers and plain
    /// names; a structural dump for everything else.
    pub fn attribute_text(&self) -> String {
        match self {
            Expr::Str(s) => s.clone(),
            Expr::Number(n) => n.clone(),
            Expr::Name(n) if !n.contains('.') => n.clone(),
            other => other.dump(),
        }
    }

    pub fn dump(&self) -> String {
        match self {
            Expr::Name(n) => {
                let mut parts = n.split('.');
                let first = parts.next().unwrap_or_default();
                parts.fold(format!("Name(id={})", repr(first)), |acc, attr| {
                    format!("Attribute(value={}, attr={})", acc, repr(attr))
                })
            }
            Expr::Str(s) => format!("Constant(value={})", repr(s)),
            Expr::Number(n) => format!("Constant(value={})", n),
            Expr::Call {
                func,
                args,
                keywords,
            } => format!(
                "Call(func={}, args=[{}], keywords=[{}])",
                func.dump(),
                args.iter().map(Expr::dump).collect::<Vec<_>>().join(", "),
                keywords
                    .iter()
                    .map(|k| format!("keyword(arg={}, value={})", repr(&k.arg), k.value.dump()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Expr::List(items) => format!(
                "List(elts=[{}])",
                items.iter().map(Expr::dump).collect::<Vec<_>>().join(", ")
            ),
            Expr::Tuple(items) => format!(
                "Tuple(elts=[{}])",
                items.iter().map(Expr::dump).collect::<Vec<_>>().join(", ")
            ),
            Expr::Neg(inner) => format!("UnaryOp(op=USub(), operand={})", inner.dump()),
            Expr::Verbatim(text) => text.clone(),
        }
    }
}

fn quote_literal(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n");
    format!("'{}'", escaped)
}

fn repr(s: &str) -> String {
    quote_literal(s)
}

pub const GENERIC_COLUMN: &str = "Column";
pub const UNKNOWN_TYPE: &str = "UnknownType";
pub const TABLENAME_ATTR: &str = "__tablename__";

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub value: Expr,
    /// `# ...` after the declaration on its last line, without the `#`.
    pub trailing_comment: Option<String>,
}

impl ColumnDef {
    /// `name = Column(Type, key=value, ...)`.
    pub fn new(name: impl Into<String>, column_type: &str, keywords: Vec<Keyword>) -> Self {
        Self {
            name: name.into(),
            value: Expr::Call {
                func: Box::new(Expr::name(GENERIC_COLUMN)),
                args: vec![Expr::name(column_type)],
                keywords,
            },
            trailing_comment: None,
        }
    }

    fn is_generic_wrapper(&self) -> bool {
        matches!(&self.value, Expr::Call { func, .. } if func.callee_name() == Some(GENERIC_COLUMN))
    }

    /// The type expression: first positional argument of a `Column(...)` wrapper, or the
    /// call itself for a bare constructor.
    pub fn type_expr(&self) -> Option<&Expr> {
        match &self.value {
            Expr::Call { args, .. } if self.is_generic_wrapper() => args
                .iter()
                .find(|a| matches!(a, Expr::Name(_) | Expr::Call { .. })),
            call @ Expr::Call { .. } => Some(call),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        self.type_expr()
            .and_then(Expr::callee_name)
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_TYPE.to_string())
    }

    pub fn keywords(&self) -> &[Keyword] {
        match &self.value {
            Expr::Call { keywords, .. } => keywords,
            _ => &[],
        }
    }

    pub fn keyword(&self, arg: &str) -> Option<&Expr> {
        self.keywords()
            .iter()
            .find(|k| k.arg == arg)
            .map(|k| &k.value)
    }

    pub fn attributes(&self) -> String {
        self.keywords()
            .iter()
            .map(|k| format!("{}={}", k.arg, k.value.attribute_text()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_primary_key(&self) -> bool {
        self.keyword("primary_key").and_then(Expr::as_bool) == Some(true)
    }

    /// Replaces the type, keeping the wrapper and its keywords.
    pub fn set_type(&mut self, column_type: &str) {
        let wrapped = self.is_generic_wrapper();
        match &mut self.value {
            Expr::Call { args, .. } if wrapped => {
                let slot = args
                    .iter_mut()
                    .find(|a| matches!(a, Expr::Name(_) | Expr::Call { .. }));
                match slot {
                    Some(existing) => *existing = Expr::name(column_type),
                    None => args.insert(0, Expr::name(column_type)),
                }
            }
            Expr::Call { func, .. } => *func = Box::new(Expr::name(column_type)),
            other => {
                *other = Expr::Call {
                    func: Box::new(Expr::name(GENERIC_COLUMN)),
                    args: vec![Expr::name(column_type)],
                    keywords: Vec::new(),
                }
            }
        }
    }

    /// Order-preserving merge: an incoming keyword replaces an existing one with the same
    /// name in place, new names are appended.
    pub fn merge_keywords(&mut self, incoming: Vec<Keyword>) {
        if incoming.is_empty() {
            return;
        }
        if !matches!(self.value, Expr::Call { .. }) {
            let current = self.type_name();
            self.set_type(&current);
        }
        if let Expr::Call { keywords, .. } = &mut self.value {
            for kw in incoming {
                match keywords.iter_mut().find(|k| k.arg == kw.arg) {
                    Some(existing) => existing.value = kw.value,
                    None => keywords.push(kw),
                }
            }
        }
    }

    pub fn to_source(&self) -> String {
        let decl = format!("{} = {}", self.name, self.value.to_source());
        match &self.trailing_comment {
            Some(comment) => format!("{}  #{}", decl, comment),
            None => decl,
        }
    }
}

/// One statement in a class body, in file order.
#[derive(Clone, Debug, PartialEq)]
pub enum BodyItem {
    TableName(String),
    Column(ColumnDef),
    /// Anything else (comments, `__table_args__`, methods), kept as written. Lines are
    /// stored relative to the class body indent.
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDef {
    pub class_name: String,
    /// Text between the parentheses of the class header.
    pub bases: String,
    pub body: Vec<BodyItem>,
}

impl TableDef {
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let table_name = class_name.to_lowercase();
        Self {
            class_name,
            bases: "Base".into(),
            body: vec![BodyItem::TableName(table_name)],
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        self.body.iter().find_map(|item| match item {
            BodyItem::TableName(n) => Some(n.as_str()),
            _ => None,
        })
    }

    pub fn set_table_name(&mut self, name: String) {
        match self
            .body
            .iter_mut()
            .find(|item| matches!(item, BodyItem::TableName(_)))
        {
            Some(slot) => *slot = BodyItem::TableName(name),
            None => self.body.insert(0, BodyItem::TableName(name)),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.body.iter().filter_map(|item| match item {
            BodyItem::Column(c) => Some(c),
            _ => None,
        })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.body.iter_mut().find_map(|item| match item {
            BodyItem::Column(c) if c.name == name => Some(c),
            _ => None,
        })
    }

    pub fn push_column(&mut self, column: ColumnDef) {
        self.body.push(BodyItem::Column(column));
    }

    pub fn remove_columns(&mut self, names: &[String]) {
        self.body.retain(|item| match item {
            BodyItem::Column(c) => !names.contains(&c.name),
            _ => true,
        });
    }

    pub fn info(&self) -> TableInfo {
        TableInfo {
            table_name: self.class_name.to_lowercase(),
            columns: self
                .columns()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    column_type: c.type_name(),
                    attributes: c.attributes(),
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    /// Top-level text outside class declarations, without surrounding blank lines.
    Text(String),
    Table(TableDef),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelFile {
    pub items: Vec<Item>,
}

impl ModelFile {
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.items.iter().filter_map(|item| match item {
            Item::Table(t) => Some(t),
            _ => None,
        })
    }

    pub fn table(&self, class_name: &str) -> Option<&TableDef> {
        self.tables().find(|t| t.class_name == class_name)
    }

    pub fn table_mut(&mut self, class_name: &str) -> Option<&mut TableDef> {
        self.items.iter_mut().find_map(|item| match item {
            Item::Table(t) if t.class_name == class_name => Some(t),
            _ => None,
        })
    }

    pub fn inventory(&self) -> Vec<TableInfo> {
        self.tables().map(TableDef::info).collect()
    }
}

/// Read-side projection of one table, as returned by the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub attributes: String,
}
