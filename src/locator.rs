use crate::page::Table;

/// How a table is picked out of a page.
///
/// The portal offers no semantic markup, so the results table is found by its
/// position and the hearings table by its header text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLocator {
    Index(usize),
    HeaderKeyword(Vec<String>),
    /// Keyword match first, then the table at `fallback_index`.
    Hybrid {
        keywords: Vec<String>,
        fallback_index: usize,
    },
}

impl TableLocator {
    pub fn header_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TableLocator::HeaderKeyword(keywords.into_iter().map(Into::into).collect())
    }

    pub fn locate<'a>(&self, tables: &'a [Table]) -> Option<&'a Table> {
        match self {
            TableLocator::Index(index) => tables.get(*index),
            TableLocator::HeaderKeyword(keywords) => {
                tables.iter().find(|table| header_matches(table, keywords))
            }
            TableLocator::Hybrid {
                keywords,
                fallback_index,
            } => tables
                .iter()
                .find(|table| header_matches(table, keywords))
                .or_else(|| tables.get(*fallback_index)),
        }
    }
}

fn header_matches(table: &Table, keywords: &[String]) -> bool {
    table.headers.iter().any(|header| {
        let upper = header.to_uppercase();
        keywords
            .iter()
            .any(|keyword| upper.contains(&keyword.to_uppercase()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::table;

    fn page() -> Vec<Table> {
        vec![
            table(&["Search"], &[], &[]),
            table(&["Name", "Age"], &[&["DOE, JANE", "41"]], &[]),
            table(&["Board of Parole Hearings"], &[], &[]),
            table(&["Parole Hearing History"], &[], &[]),
        ]
    }

    #[test]
    fn index_locator_picks_by_position() {
        let tables = page();
        let found = TableLocator::Index(1).locate(&tables).unwrap();
        assert_eq!(found.headers[0], "Name");
        assert!(TableLocator::Index(9).locate(&tables).is_none());
    }

    #[test]
    fn keyword_locator_takes_first_match_case_insensitively() {
        let tables = page();
        let found = TableLocator::header_keywords(["hearing"]).locate(&tables).unwrap();
        assert_eq!(found.headers[0], "Board of Parole Hearings");
        assert!(TableLocator::header_keywords(["sentence"]).locate(&tables).is_none());
    }

    #[test]
    fn hybrid_falls_back_to_index() {
        let tables = page();
        let locator = TableLocator::Hybrid {
            keywords: vec!["AGE".to_string()],
            fallback_index: 0,
        };
        assert_eq!(locator.locate(&tables).unwrap().headers[0], "Name");

        let fallback = TableLocator::Hybrid {
            keywords: vec!["nothing".to_string()],
            fallback_index: 0,
        };
        assert_eq!(fallback.locate(&tables).unwrap().headers[0], "Search");
    }
}
