// Database queries: CRUD operations for the comment store.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use super::models::{
    ColumnInfo, CommentQuery, ForeignKey, LabelCount, LabelDistribution, StoredComment,
    TableSummary,
};
use crate::labels::{HateCategory, ToneLabel};

// --- Comments ---

/// Insert one classified comment and return its row id.
///
/// Runs as its own statement: a failure here leaves every other row intact.
pub fn insert_comment(
    conn: &Connection,
    text: &str,
    tone: ToneLabel,
    hate: HateCategory,
    source: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO comment (text, tone_id, hate_id, source) VALUES (?1, ?2, ?3, ?4)",
        params![text, tone.db_id(), hate.db_id(), source],
    )?;
    Ok(conn.last_insert_rowid())
}

const COMMENT_JOIN: &str = "FROM comment c
     JOIN tone t ON t.id = c.tone_id
     JOIN hate h ON h.id = c.hate_id";

/// Escape LIKE wildcards so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// WHERE clause for `query` plus the values bound to it, numbered from ?1.
fn where_clause(query: &CommentQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(search) = &query.search {
        values.push(Value::Text(escape_like(&search.term)));
        clauses.push(format!(
            "{} LIKE '%' || ?{} || '%' ESCAPE '\\'",
            search.field.column(),
            values.len()
        ));
    }
    if let Some(tone) = query.tone {
        values.push(Value::Integer(tone.db_id()));
        clauses.push(format!("c.tone_id = ?{}", values.len()));
    }
    if let Some(hate) = query.hate {
        values.push(Value::Integer(hate.db_id()));
        clauses.push(format!("c.hate_id = ?{}", values.len()));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

/// Count comments matching `query`.
pub fn count_comments(conn: &Connection, query: &CommentQuery) -> Result<i64> {
    let (filter_sql, values) = where_clause(query);
    let sql = format!("SELECT COUNT(*) {COMMENT_JOIN} {filter_sql}");
    let count = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
    Ok(count)
}

/// One page of comments matching `query`, newest first. `page` is 1-based;
/// page 0 is treated as page 1.
pub fn list_comments(
    conn: &Connection,
    query: &CommentQuery,
    page: u32,
    page_size: u32,
) -> Result<Vec<StoredComment>> {
    let limit = i64::from(page_size.max(1));
    let offset = i64::from(page.max(1) - 1) * limit;

    let (filter_sql, mut values) = where_clause(query);
    let limit_idx = values.len() + 1;
    values.push(Value::Integer(limit));
    values.push(Value::Integer(offset));

    let sql = format!(
        "SELECT c.id, c.text, t.name, h.name, c.source, c.created_at
         {COMMENT_JOIN} {filter_sql}
         ORDER BY c.id DESC
         LIMIT ?{limit_idx} OFFSET ?{}",
        limit_idx + 1
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(StoredComment {
                id: row.get(0)?,
                text: row.get(1)?,
                tone: row.get(2)?,
                hate: row.get(3)?,
                source: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Delete every comment. Lookup tables are left untouched.
pub fn clear_comments(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM comment", [])?;
    Ok(deleted)
}

// --- Statistics ---

/// Comment counts per tone and per hate category, including zero counts.
pub fn label_distribution(conn: &Connection) -> Result<LabelDistribution> {
    Ok(LabelDistribution {
        tones: lookup_counts(conn, "tone", "tone_id")?,
        hates: lookup_counts(conn, "hate", "hate_id")?,
    })
}

fn lookup_counts(conn: &Connection, table: &str, fk: &str) -> Result<Vec<LabelCount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT l.name, COUNT(c.id)
         FROM {table} l
         LEFT JOIN comment c ON c.{fk} = l.id
         GROUP BY l.id
         ORDER BY l.id"
    ))?;
    let counts = stmt
        .query_map([], |row| {
            Ok(LabelCount {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counts)
}

/// Row count, columns and foreign keys of every user table, by name.
pub fn table_summary(conn: &Connection) -> Result<Vec<TableSummary>> {
    let names: Vec<String> = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut columns_stmt = conn.prepare(
        "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let mut fk_stmt = conn.prepare(
        "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
    )?;

    let mut summaries = Vec::with_capacity(names.len());
    for name in names {
        let rows: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", name.replace('"', "\"\"")),
            [],
            |row| row.get(0),
        )?;

        let columns = columns_stmt
            .query_map([name.as_str()], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    decl_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    primary_key: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let foreign_keys = fk_stmt
            .query_map([name.as_str()], |row| {
                Ok(ForeignKey {
                    from: row.get(0)?,
                    table: row.get(1)?,
                    to: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        summaries.push(TableSummary {
            name,
            rows,
            columns,
            foreign_keys,
        });
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CommentFilter, FilterField};
    use crate::db::schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        schema::create_tables(&conn).unwrap();
        schema::seed_lookup_tables(&conn).unwrap();
        conn
    }

    fn all() -> CommentQuery {
        CommentQuery::default()
    }

    fn insert_sample(conn: &Connection) {
        insert_comment(conn, "you are awful", ToneLabel::Insult, HateCategory::Other, Some("youtube")).unwrap();
        insert_comment(conn, "nice video", ToneLabel::Positive, HateCategory::NoAbuse, None).unwrap();
        insert_comment(conn, "go back home", ToneLabel::Insult, HateCategory::Xenophobia, Some("telegram")).unwrap();
    }

    #[test]
    fn test_insert_uses_lookup_ids() {
        let conn = setup();
        let id = insert_comment(&conn, "hello", ToneLabel::Neutral, HateCategory::NoAbuse, None).unwrap();
        let (tone_id, hate_id): (i64, i64) = conn
            .query_row(
                "SELECT tone_id, hate_id FROM comment WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((tone_id, hate_id), (2, 1));
    }

    #[test]
    fn test_insert_rejects_dangling_foreign_key() {
        let conn = setup();
        conn.execute("DELETE FROM hate WHERE id = 6", []).unwrap();
        let result = insert_comment(&conn, "x", ToneLabel::Insult, HateCategory::Other, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_list_comments_newest_first_with_names() {
        let conn = setup();
        insert_sample(&conn);

        let page = list_comments(&conn, &all(), 1, 10).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].text, "go back home");
        assert_eq!(page[0].tone, "Insult");
        assert_eq!(page[0].hate, "Xenophobia");
        assert_eq!(page[0].source.as_deref(), Some("telegram"));
        assert_eq!(page[2].text, "you are awful");
    }

    #[test]
    fn test_list_comments_paging() {
        let conn = setup();
        insert_sample(&conn);

        let first = list_comments(&conn, &all(), 1, 2).unwrap();
        let second = list_comments(&conn, &all(), 2, 2).unwrap();
        let third = list_comments(&conn, &all(), 3, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(third.is_empty());
        assert_eq!(second[0].text, "you are awful");

        // Page 0 behaves like page 1
        assert_eq!(list_comments(&conn, &all(), 0, 2).unwrap(), first);
    }

    #[test]
    fn test_filter_by_text_and_label() {
        let conn = setup();
        insert_sample(&conn);

        let by_text = CommentFilter {
            field: FilterField::Text,
            term: "VIDEO".into(),
        };
        let hits = list_comments(&conn, &CommentQuery::search(by_text.clone()), 1, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "nice video");
        assert_eq!(count_comments(&conn, &CommentQuery::search(by_text)).unwrap(), 1);

        let by_tone = CommentFilter {
            field: FilterField::Tone,
            term: "insult".into(),
        };
        assert_eq!(count_comments(&conn, &CommentQuery::search(by_tone)).unwrap(), 2);

        let by_hate = CommentFilter {
            field: FilterField::Hate,
            term: "xeno".into(),
        };
        let hits = list_comments(&conn, &CommentQuery::search(by_hate), 1, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "go back home");
    }

    #[test]
    fn test_filter_term_is_bound_not_interpolated() {
        let conn = setup();
        insert_sample(&conn);
        let hostile = CommentFilter {
            field: FilterField::Text,
            term: "'; DROP TABLE comment; --".into(),
        };
        assert_eq!(count_comments(&conn, &CommentQuery::search(hostile)).unwrap(), 0);
        assert_eq!(count_comments(&conn, &all()).unwrap(), 3);
    }

    #[test]
    fn test_label_distribution_includes_zero_counts() {
        let conn = setup();
        insert_sample(&conn);

        let dist = label_distribution(&conn).unwrap();
        let tones: Vec<(&str, i64)> = dist.tones.iter().map(|c| (c.name.as_str(), c.count)).collect();
        assert_eq!(tones, vec![("Insult", 2), ("Neutral", 0), ("Positive", 1)]);
        assert_eq!(dist.hates.len(), 6);
        assert_eq!(dist.hates[0].name, "No abuse");
        assert_eq!(dist.hates[0].count, 1);
        assert_eq!(dist.total(), 3);
    }

    #[test]
    fn test_table_summary_reports_foreign_keys() {
        let conn = setup();
        insert_sample(&conn);

        let summary = table_summary(&conn).unwrap();
        let names: Vec<&str> = summary.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["comment", "hate", "schema_version", "tone"]);

        let comment = &summary[0];
        assert_eq!(comment.rows, 3);
        assert!(comment.columns.iter().any(|c| c.name == "text" && c.not_null));
        assert!(comment.columns.iter().any(|c| c.name == "id" && c.primary_key));
        let mut targets: Vec<&str> = comment.foreign_keys.iter().map(|f| f.table.as_str()).collect();
        targets.sort();
        assert_eq!(targets, vec!["hate", "tone"]);

        let tone = summary.iter().find(|t| t.name == "tone").unwrap();
        assert_eq!(tone.rows, 3);
    }

    #[test]
    fn test_clear_comments_keeps_lookups() {
        let conn = setup();
        insert_sample(&conn);
        assert_eq!(clear_comments(&conn).unwrap(), 3);
        assert_eq!(count_comments(&conn, &all()).unwrap(), 0);
        schema::verify_lookup_seed(&conn).unwrap();
    }

    #[test]
    fn test_like_wildcards_in_term_match_literally() {
        let conn = setup();
        insert_comment(&conn, "nice video", ToneLabel::Positive, HateCategory::NoAbuse, None).unwrap();
        insert_comment(&conn, "100% awful", ToneLabel::Insult, HateCategory::Other, None).unwrap();
        insert_comment(&conn, "snake_case only", ToneLabel::Neutral, HateCategory::NoAbuse, None).unwrap();

        let text = |term: &str| {
            CommentQuery::search(CommentFilter {
                field: FilterField::Text,
                term: term.into(),
            })
        };
        assert_eq!(count_comments(&conn, &text("%")).unwrap(), 1);
        assert_eq!(count_comments(&conn, &text("_")).unwrap(), 1);
        assert_eq!(count_comments(&conn, &text("e_c")).unwrap(), 1);
        assert_eq!(count_comments(&conn, &text("i_e")).unwrap(), 0);
        assert_eq!(count_comments(&conn, &text("\\")).unwrap(), 0);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_tone_and_hate_filters_combine() {
        let conn = setup();
        insert_sample(&conn);
        insert_comment(&conn, "ugly and dumb", ToneLabel::Insult, HateCategory::Lookism, None).unwrap();

        let insults = CommentQuery {
            tone: Some(ToneLabel::Insult),
            ..CommentQuery::default()
        };
        assert_eq!(count_comments(&conn, &insults).unwrap(), 3);

        let xenophobic_insults = CommentQuery {
            tone: Some(ToneLabel::Insult),
            hate: Some(HateCategory::Xenophobia),
            ..CommentQuery::default()
        };
        let hits = list_comments(&conn, &xenophobic_insults, 1, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "go back home");

        let none = CommentQuery {
            tone: Some(ToneLabel::Positive),
            hate: Some(HateCategory::Lookism),
            ..CommentQuery::default()
        };
        assert_eq!(count_comments(&conn, &none).unwrap(), 0);

        // Labels and a text search together
        let searched = CommentQuery {
            search: Some(CommentFilter {
                field: FilterField::Text,
                term: "dumb".into(),
            }),
            tone: Some(ToneLabel::Insult),
            hate: None,
        };
        let hits = list_comments(&conn, &searched, 1, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hate, "Lookism");
    }
}
