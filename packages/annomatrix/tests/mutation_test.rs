mod common;

use annomatrix::{clip_matrix, AnnoError, AnnoMatrix, ColumnSchema, ColumnValue, Field, Query};
use common::strings;
use std::sync::Arc;

fn categories(matrix: &AnnoMatrix, column: &str) -> Vec<ColumnValue> {
    matrix
        .schema()
        .annotations(Field::Obs)
        .ok()
        .and_then(|a| a.column(column))
        .and_then(|c| c.categories.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_add_column_is_local_and_versioned() {
    let (source, loader) = common::loader();
    let schema = ColumnSchema::writable_categorical("cell_type", vec!["unassigned".into()]);
    let next = loader.add_obs_column(schema, "unassigned").unwrap();

    let df = next.fetch(Field::Obs, "cell_type").await.unwrap();
    assert_eq!(strings(&df, "cell_type"), vec!["unassigned"; 5]);
    assert_eq!(source.request_count(), 0);

    // the receiver is untouched
    assert!(matches!(
        loader.fetch(Field::Obs, "cell_type").await,
        Err(AnnoError::UnknownColumn { .. })
    ));
    assert!(matches!(
        next.add_obs_column(ColumnSchema::writable_categorical("cell_type", vec![]), "a"),
        Err(AnnoError::DuplicateLabel(_))
    ));
}

#[tokio::test]
async fn test_set_values_through_view_chain() {
    let (_, loader) = common::loader();
    let subset = AnnoMatrix::isubset(&loader, &[0, 1, 2]).unwrap();
    let top = clip_matrix(&subset, 0.1, 0.9).unwrap();
    top.fetch(Field::Obs, "notes").await.unwrap();

    let next = top.set_obs_column_values("notes", vec![1, 4], "y").await.unwrap();
    assert_eq!(next.view_chain(), top.view_chain());
    assert_eq!(next.clip_range(), top.clip_range());
    assert!(!next.is_resident(Field::Obs, &Query::column("notes")));

    let notes = next.fetch(Field::Obs, "notes").await.unwrap();
    assert_eq!(strings(&notes, "notes"), vec!["x", "y", "x"]);

    // rows outside the subset were edited at the loader too
    let root = next.view_of().and_then(|v| v.view_of()).unwrap();
    let all = root.fetch(Field::Obs, "notes").await.unwrap();
    assert_eq!(strings(&all, "notes"), vec!["x", "y", "x", "x", "y"]);

    let old = top.fetch(Field::Obs, "notes").await.unwrap();
    assert_eq!(strings(&old, "notes"), vec!["x", "x", "x"]);
}

#[tokio::test]
async fn test_new_values_become_categories() {
    let (_, loader) = common::loader();
    let next = loader.set_obs_column_values("notes", vec![0], "z").await.unwrap();
    assert!(categories(&next, "notes").contains(&"z".into()));
    assert!(!categories(&loader, "notes").contains(&"z".into()));
}

#[tokio::test]
async fn test_readonly_columns_rejected() {
    let (_, loader) = common::loader();
    let err = loader.set_obs_column_values("louvain", vec![0], "b").await.unwrap_err();
    assert_eq!(err, AnnoError::ReadOnlyColumn("louvain".into()));
    assert!(loader.drop_obs_column("age").is_err());
}

#[tokio::test]
async fn test_rename_evicts_stale_copies() {
    let (_, loader) = common::loader();
    let subset = AnnoMatrix::isubset(&loader, &[3, 4]).unwrap();
    subset.fetch(Field::Obs, "notes").await.unwrap();

    let renamed = subset.rename_obs_column("notes", "comments").await.unwrap();
    let df = renamed.fetch(Field::Obs, "comments").await.unwrap();
    assert_eq!(strings(&df, "comments"), vec!["x", "x"]);
    assert!(matches!(
        renamed.fetch(Field::Obs, "notes").await,
        Err(AnnoError::UnknownColumn { .. })
    ));
}

#[tokio::test]
async fn test_category_lifecycle() {
    let (_, loader) = common::loader();
    let with_label = loader.add_obs_anno_category("notes", "w").unwrap();
    assert!(matches!(
        with_label.add_obs_anno_category("notes", "w"),
        Err(AnnoError::DuplicateLabel(_))
    ));

    let reset = with_label.reset_obs_column_values("notes", "x", "w").await.unwrap();
    let df = reset.fetch(Field::Obs, "notes").await.unwrap();
    assert_eq!(strings(&df, "notes"), vec!["w"; 5]);

    let removed = reset
        .remove_obs_anno_category("notes", "w", "unassigned")
        .await
        .unwrap();
    let df = removed.fetch(Field::Obs, "notes").await.unwrap();
    assert_eq!(strings(&df, "notes"), vec!["unassigned"; 5]);
    let cats = categories(&removed, "notes");
    assert!(!cats.contains(&"w".into()));
    assert!(cats.contains(&"unassigned".into()));
}

#[tokio::test]
async fn test_drop_column() {
    let (_, loader) = common::loader();
    loader.fetch(Field::Obs, "notes").await.unwrap();
    let dropped = loader.drop_obs_column("notes").unwrap();
    assert!(!dropped.schema().has_column(Field::Obs, "notes"));
    assert!(!dropped.is_resident(Field::Obs, &Query::column("notes")));
    assert!(loader.is_resident(Field::Obs, &Query::column("notes")));
    assert!(!Arc::ptr_eq(&dropped, &loader));
}
