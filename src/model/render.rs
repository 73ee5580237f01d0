//! Deterministic re-serialization of a parsed model file.

use crate::model::types::{BodyItem, Item, ModelFile, TableDef, TABLENAME_ATTR};

const INDENT: &str = "    ";

/// Top-level items are separated by two blank lines; the output ends with one newline.
pub fn render_model(model: &ModelFile) -> String {
    let mut out = String::new();
    for item in &model.items {
        if !out.is_empty() {
            out.push_str("\n\n\n");
        }
        match item {
            Item::Text(text) => out.push_str(text),
            Item::Table(table) => out.push_str(&render_table(table)),
        }
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

pub fn render_table(table: &TableDef) -> String {
    let mut lines = Vec::with_capacity(table.body.len() + 1);
    lines.push(format!("class {}({}):", table.class_name, table.bases));
    for item in &table.body {
        match item {
            BodyItem::TableName(name) => {
                lines.push(format!("{}{} = '{}'", INDENT, TABLENAME_ATTR, name))
            }
            BodyItem::Column(col) => lines.push(format!("{}{}", INDENT, col.to_source())),
            BodyItem::Raw(raw) => lines.extend(raw.split('\n').map(|l| {
                if l.is_empty() {
                    String::new()
                } else {
                    format!("{}{}", INDENT, l)
                }
            })),
        }
    }
    if table.body.is_empty() {
        lines.push(format!("{}pass", INDENT));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parser::parse_model;
    use crate::model::types::{ColumnDef, Expr, Keyword};

    #[test]
    fn new_table_renders_canonical_block() {
        let mut table = TableDef::new("Users");
        table.push_column(ColumnDef::new(
            "id",
            "Integer",
            vec![Keyword::new("primary_key", Expr::name("True"))],
        ));
        table.push_column(ColumnDef::new("email", "String", vec![]));
        let model = ModelFile {
            items: vec![Item::Text("Base = declarative_base()".into()), Item::Table(table)],
        };
        assert_eq!(
            render_model(&model),
            "Base = declarative_base()\n\n\nclass Users(Base):\n    __tablename__ = 'users'\n    id = Column(Integer, primary_key=True)\n    email = Column(String)\n"
        );
    }

    #[test]
    fn render_is_stable_across_reparse() {
        let source = "import x\n\n\n\nclass A(Base):\n    __tablename__ = \"a\"\n    # note\n    id = Column(Integer,\n        primary_key=True)\n\nclass B(Base):\n    pass\n";
        let first = render_model(&parse_model(source).unwrap());
        let second = render_model(&parse_model(&first).unwrap());
        assert_eq!(first, second);
        assert!(first.contains("    id = Column(Integer, primary_key=True)\n"));
        assert!(first.contains("    # note\n"));
    }

    #[test]
    fn methods_and_class_settings_survive_a_rewrite() {
        let source = "class Users(Base):\n  __tablename__ = 'users'\n  __table_args__ = {'extend_existing': True}\n  id = Column(Integer, primary_key=True)  # surrogate key\n\n  @property\n  def label(self):\n      name = self.id\n\n      return name\n";
        let mut model = parse_model(source).unwrap();
        let users = model.table_mut("Users").unwrap();
        users.push_column(ColumnDef::new("email", "String", vec![]));

        let rendered = render_model(&model);
        assert_eq!(
            rendered,
            "class Users(Base):\n    __tablename__ = 'users'\n    __table_args__ = {'extend_existing': True}\n    id = Column(Integer, primary_key=True)  # surrogate key\n    @property\n    def label(self):\n        name = self.id\n\n        return name\n    email = Column(String)\n"
        );
        let reparsed = parse_model(&rendered).unwrap();
        let names: Vec<_> = reparsed.inventory()[0].columns.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["id", "email"]);
    }

    #[test]
    fn empty_model_renders_empty() {
        assert_eq!(render_model(&ModelFile::default()), "");
    }
}
