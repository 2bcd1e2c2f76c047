//! Backend context snapshots
//!
//! A `BackendContext` is what the translator sees about the backend: the
//! catalog of a database, the sampled collections of a document store, or
//! the inventory of a cloud account or cluster.
//! Every listing is sorted before rendering so the text is deterministic for
//! a given backend state.

use std::collections::BTreeMap;
use std::fmt;

/// Identifier quoting for a SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    /// `"name"` (`PostgreSQL`, `SQLite`)
    DoubleQuote,
    /// `` `name` `` (`MySQL`)
    Backtick,
}

impl QuoteStyle {
    #[must_use]
    pub const fn quote_char(self) -> char {
        match self {
            Self::DoubleQuote => '"',
            Self::Backtick => '`',
        }
    }

    /// Quote an identifier, doubling any embedded quote character
    #[must_use]
    pub fn quote(self, ident: &str) -> String {
        let q = self.quote_char();
        let escaped = ident.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Quote only when the identifier contains an uppercase letter
    #[must_use]
    pub fn quote_if_mixed_case(self, ident: &str) -> String {
        if has_uppercase(ident) {
            self.quote(ident)
        } else {
            ident.to_string()
        }
    }
}

fn has_uppercase(s: &str) -> bool {
    s.chars().any(char::is_uppercase)
}

/// One row of a catalog query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub ordinal: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnEntry {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnEntry>,
}

impl TableEntry {
    /// `schema.table`, with every part quoted when the key has an uppercase letter
    #[must_use]
    pub fn key(&self, quote: QuoteStyle) -> String {
        let raw = format!("{}.{}", self.schema, self.table);
        if has_uppercase(&raw) {
            format!("{}.{}", quote.quote(&self.schema), quote.quote(&self.table))
        } else {
            raw
        }
    }
}

/// Tables and columns of a relational database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCatalog {
    pub dialect: String,
    pub quote: QuoteStyle,
    pub tables: Vec<TableEntry>,
}

impl DatabaseCatalog {
    /// Sort catalog rows by (schema, table, ordinal) and group them per table
    #[must_use]
    pub fn from_rows(dialect: impl Into<String>, quote: QuoteStyle, mut rows: Vec<CatalogRow>) -> Self {
        rows.sort_by(|a, b| {
            (&a.schema, &a.table, a.ordinal).cmp(&(&b.schema, &b.table, b.ordinal))
        });

        let mut grouped: BTreeMap<(String, String), Vec<ColumnEntry>> = BTreeMap::new();
        for row in rows {
            grouped
                .entry((row.schema, row.table))
                .or_default()
                .push(ColumnEntry { name: row.column, data_type: row.data_type });
        }

        let tables = grouped
            .into_iter()
            .map(|((schema, table), columns)| TableEntry { schema, table, columns })
            .collect();

        Self { dialect: dialect.into(), quote, tables }
    }

    fn render(&self) -> String {
        let mut lines = vec![format!("Database schema ({}):", self.dialect)];

        if self.tables.is_empty() {
            lines.push("No tables found.".to_string());
            return lines.join("\n");
        }

        let mut quoted_any = false;
        for table in &self.tables {
            let key = table.key(self.quote);
            quoted_any |= key.contains(self.quote.quote_char());

            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    let name = self.quote.quote_if_mixed_case(&c.name);
                    quoted_any |= name.starts_with(self.quote.quote_char());
                    format!("{name} ({})", c.data_type)
                })
                .collect();

            lines.push(format!("Table {key}: {}", columns.join(", ")));
        }

        if quoted_any {
            lines.push(
                "Note: quoted identifiers are case-sensitive; use them exactly as shown, quotes included."
                    .to_string(),
            );
        }

        lines.join("\n")
    }
}

/// One category of an inventory listing
///
/// A failed listing keeps its reason so the rest of the inventory still renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventorySection {
    pub title: String,
    pub entries: Result<Vec<String>, String>,
}

impl InventorySection {
    pub fn new(title: impl Into<String>, entries: Result<Vec<String>, String>) -> Self {
        let entries = entries.map(|mut items| {
            items.sort();
            items
        });
        Self { title: title.into(), entries }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.entries.is_ok()
    }
}

/// Resources of a cloud account or cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    pub heading: String,
    pub sections: Vec<InventorySection>,
    pub notes: Vec<String>,
}

impl Inventory {
    pub fn new(heading: impl Into<String>) -> Self {
        Self { heading: heading.into(), sections: Vec::new(), notes: Vec::new() }
    }

    #[must_use]
    pub fn section(mut self, section: InventorySection) -> Self {
        self.sections.push(section);
        self
    }

    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Reasons of failed sections, as `(title, reason)`
    #[must_use]
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.sections
            .iter()
            .filter_map(|s| s.entries.as_ref().err().map(|e| (s.title.as_str(), e.as_str())))
            .collect()
    }

    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.sections.is_empty() && self.sections.iter().all(|s| !s.is_available())
    }

    fn render(&self) -> String {
        let mut lines = vec![format!("{}:", self.heading)];
        for section in &self.sections {
            let body = match &section.entries {
                Ok(items) if items.is_empty() => "(none)".to_string(),
                Ok(items) => items.join(", "),
                Err(reason) => format!("unavailable: {reason}"),
            };
            lines.push(format!("{}: {body}", section.title));
        }
        lines.extend(self.notes.iter().map(|n| format!("Note: {n}")));
        lines.join("\n")
    }
}

/// Per-session snapshot of what a backend contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendContext {
    Database(DatabaseCatalog),
    /// Document store: one section of sampled fields per collection
    Collections(Inventory),
    Cloud(Inventory),
    Kubernetes(Inventory),
}

impl BackendContext {
    /// Natural-language block handed to the translator
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Database(catalog) => catalog.render(),
            Self::Collections(inventory) | Self::Cloud(inventory) | Self::Kubernetes(inventory) => {
                inventory.render()
            }
        }
    }
}

impl fmt::Display for BackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(schema: &str, table: &str, column: &str, data_type: &str, ordinal: i64) -> CatalogRow {
        CatalogRow {
            schema: schema.to_string(),
            table: table.to_string(),
            column: column.to_string(),
            data_type: data_type.to_string(),
            ordinal,
        }
    }

    #[test]
    fn test_catalog_sorted_and_grouped() {
        let rows = vec![
            row("public", "orders", "total", "numeric", 2),
            row("public", "accounts", "email", "text", 2),
            row("public", "orders", "id", "integer", 1),
            row("public", "accounts", "id", "integer", 1),
        ];

        let catalog = DatabaseCatalog::from_rows("PostgreSQL", QuoteStyle::DoubleQuote, rows);
        let rendered = BackendContext::Database(catalog).render();

        insta::assert_snapshot!(rendered, @r"
Database schema (PostgreSQL):
Table public.accounts: id (integer), email (text)
Table public.orders: id (integer), total (numeric)
");
    }

    #[test]
    fn test_mixed_case_identifiers_are_quoted() {
        let rows = vec![
            row("public", "OrderItems", "orderId", "integer", 1),
            row("public", "OrderItems", "qty", "integer", 2),
        ];

        let catalog = DatabaseCatalog::from_rows("PostgreSQL", QuoteStyle::DoubleQuote, rows);
        let rendered = catalog.render();

        assert!(rendered.contains(r#"Table "public"."OrderItems": "orderId" (integer), qty (integer)"#));
        assert!(rendered.contains("case-sensitive"));
    }

    #[test]
    fn test_mysql_quotes_with_backticks() {
        let rows = vec![row("shop", "Users", "firstName", "varchar", 1)];
        let catalog = DatabaseCatalog::from_rows("MySQL", QuoteStyle::Backtick, rows);

        assert!(catalog.render().contains("Table `shop`.`Users`: `firstName` (varchar)"));
    }

    #[test]
    fn test_quote_escapes_embedded_quote_char() {
        assert_eq!(QuoteStyle::DoubleQuote.quote(r#"a"b"#), r#""a""b""#);
        assert_eq!(QuoteStyle::Backtick.quote("a`b"), "`a``b`");
        assert_eq!(QuoteStyle::DoubleQuote.quote_if_mixed_case("plain"), "plain");
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = DatabaseCatalog::from_rows("SQLite", QuoteStyle::DoubleQuote, Vec::new());
        assert_eq!(catalog.render(), "Database schema (SQLite):\nNo tables found.");
    }

    #[test]
    fn test_inventory_partial_failure_still_renders() {
        let inventory = Inventory::new("Kubernetes cluster (context dev)")
            .section(InventorySection::new(
                "Namespaces",
                Ok(vec!["kube-system".to_string(), "default".to_string()]),
            ))
            .section(InventorySection::new("Pods", Err("forbidden".to_string())))
            .section(InventorySection::new("Services", Ok(Vec::new())))
            .note("pass --context dev to every kubectl command");

        assert_eq!(inventory.failures(), vec![("Pods", "forbidden")]);
        assert!(!inventory.all_failed());

        insta::assert_snapshot!(BackendContext::Kubernetes(inventory).render(), @r"
Kubernetes cluster (context dev):
Namespaces: default, kube-system
Pods: unavailable: forbidden
Services: (none)
Note: pass --context dev to every kubectl command
");
    }

    #[test]
    fn test_all_failed() {
        let inventory = Inventory::new("Azure")
            .section(InventorySection::new("Resource groups", Err("a".to_string())))
            .section(InventorySection::new("Virtual machines", Err("b".to_string())));
        assert!(inventory.all_failed());
        assert!(!Inventory::new("empty").all_failed());
    }
}
