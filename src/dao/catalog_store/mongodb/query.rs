//! Translation of [`GameQuery`] into MongoDB filter and sort documents.

use mongodb::bson::{Bson, Document, doc};

use crate::dao::query::{
    FREE_PRICE, GameQuery, Predicate, SortColumn, SortDirection, SortDirective,
};

fn column_field(column: SortColumn) -> &'static str {
    match column {
        SortColumn::Title => "title",
        SortColumn::PlayerLimit => "player_limit",
        SortColumn::SamePcLimit => "same_pc_limit",
        SortColumn::Genre => "genre",
        SortColumn::ReleaseYear => "release_year",
    }
}

fn contains_ignore_case(needle: &str) -> Document {
    doc! { "$regex": regex::escape(needle), "$options": "i" }
}

fn predicate_document(predicate: &Predicate) -> Document {
    match predicate {
        Predicate::TitleOrGenreContains(needle) => doc! {
            "$or": [
                { "title": contains_ignore_case(needle) },
                { "genre": contains_ignore_case(needle) },
            ]
        },
        Predicate::PlayerLimitAtLeast(min) => doc! { "player_limit": { "$gte": i64::from(*min) } },
        Predicate::PlayerLimitAtMost(max) => doc! { "player_limit": { "$lte": i64::from(*max) } },
        Predicate::SamePcLimitAtLeast(min) => {
            doc! { "same_pc_limit": { "$gte": i64::from(*min) } }
        }
        Predicate::ReleasedFrom(min) => doc! { "release_year": { "$gte": *min } },
        Predicate::ReleasedUntil(max) => doc! { "release_year": { "$lte": *max } },
        Predicate::Online => doc! { "online": true },
        Predicate::Offline => doc! { "offline": true },
        Predicate::Free => doc! {
            "$or": [
                { "price": Bson::Null },
                { "price": "" },
                { "price": FREE_PRICE },
            ]
        },
        Predicate::Priced => doc! { "price": { "$nin": [Bson::Null, "", FREE_PRICE] } },
    }
}

/// Conjunction of every predicate; an empty document matches everything.
pub fn filter_document(query: &GameQuery) -> Document {
    let clauses: Vec<Document> = query.predicates().iter().map(predicate_document).collect();
    match clauses.len() {
        0 => Document::new(),
        1 => clauses.into_iter().next().unwrap_or_default(),
        _ => doc! { "$and": clauses },
    }
}

/// Sort keys in priority order, closed by `_id` so equal rows keep a stable order.
pub fn sort_document(sort: &[SortDirective]) -> Document {
    let mut document = Document::new();
    for directive in sort {
        let order = match directive.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        document.insert(column_field(directive.column), order);
    }
    document.insert("_id", 1);
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::query::GameFilter;

    #[test]
    fn empty_filter_matches_everything() {
        let query = GameQuery::default();
        assert!(filter_document(&query).is_empty());
    }

    #[test]
    fn search_is_escaped() {
        let query = GameQuery::new(
            GameFilter {
                search: Some("C++".into()),
                ..GameFilter::default()
            },
            [],
        );
        let filter = filter_document(&query);
        let rendered = filter.to_string();
        assert!(rendered.contains(r"c\\+\\+") || rendered.contains(r"c\+\+"));
    }

    #[test]
    fn several_predicates_are_combined_with_and() {
        let query = GameQuery::new(
            GameFilter {
                online_only: true,
                player_min: Some(4),
                ..GameFilter::default()
            },
            [],
        );
        let filter = filter_document(&query);
        assert_eq!(filter.get_array("$and").map(Vec::len).ok(), Some(2));
    }

    #[test]
    fn sort_keeps_priority_and_ends_with_id() {
        let sort = [
            SortDirective::new(SortColumn::ReleaseYear, SortDirection::Desc),
            SortDirective::new(SortColumn::Title, SortDirection::Asc),
        ];
        let keys: Vec<(String, i32)> = sort_document(&sort)
            .iter()
            .map(|(key, value)| (key.clone(), value.as_i32().unwrap_or_default()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("release_year".to_owned(), -1),
                ("title".to_owned(), 1),
                ("_id".to_owned(), 1),
            ]
        );
    }
}
