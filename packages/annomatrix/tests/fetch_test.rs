mod common;

use annomatrix::{AnnoError, AnnoMatrix, Field, Query, Selector};
use common::{floats, strings, AGES, GENES};
use std::sync::Arc;
use tokio::sync::Notify;

#[tokio::test]
async fn test_concurrent_fetches_share_one_request() {
    let gate = Arc::new(Notify::new());
    let (source, matrix) = common::gated_loader(gate.clone());

    let first = matrix.fetch(Field::Obs, "age");
    let second = matrix.fetch(Field::Obs, "age");
    let release = async {
        while source.request_count() == 0 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
    };
    let (a, b, ()) = tokio::join!(first, second, release);

    assert_eq!(source.request_count(), 1);
    assert_eq!(a.unwrap(), b.unwrap());
    assert!(matrix.is_resident(Field::Obs, &Query::column("age")));
}

#[tokio::test]
async fn test_subset_query_is_cache_hit() {
    let (source, matrix) = common::loader();

    let both = matrix
        .fetch(Field::Obs, Query::columns(["age", "louvain"]))
        .await
        .unwrap();
    assert_eq!(both.labels(), vec!["age", "louvain"]);
    assert_eq!(source.request_count(), 1);

    let age = matrix.fetch(Field::Obs, "age").await.unwrap();
    assert_eq!(floats(&age, "age"), AGES.to_vec());
    assert_eq!(source.request_count(), 1);
}

#[tokio::test]
async fn test_partial_fetch_requests_only_missing() {
    let (source, matrix) = common::loader();
    matrix.fetch(Field::Obs, "age").await.unwrap();
    matrix
        .fetch(Field::Obs, Query::columns(["age", "louvain"]))
        .await
        .unwrap();

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1], (Field::Obs, Selector::Labels(vec!["louvain".into()])));
}

#[tokio::test]
async fn test_fetch_all_and_schema_cast() {
    let (_, matrix) = common::loader();
    let var = matrix.fetch_all(Field::Var).await.unwrap();
    assert_eq!(var.labels(), vec!["gene_id", "n_counts"]);
    // wire sends float, schema says int32
    assert_eq!(var.col("n_counts").unwrap().dtype(), annomatrix::DType::Int32);
}

#[tokio::test]
async fn test_unknown_labels_rejected_before_fetch() {
    let (source, matrix) = common::loader();
    let err = matrix.fetch(Field::Obs, "missing").await.unwrap_err();
    assert_eq!(err, AnnoError::unknown_column(Field::Obs, "missing"));

    let err = matrix.fetch(Field::X, "3").await.unwrap_err();
    assert!(matches!(err, AnnoError::UnknownColumn { .. }));

    assert!(matches!(
        matrix.fetch_all(Field::X).await,
        Err(AnnoError::UnknownField(_))
    ));
    assert_eq!(source.request_count(), 0);
}

#[tokio::test]
async fn test_remote_failure_leaves_cache_untouched() {
    let (source, matrix) = common::loader();
    source.fail_next(AnnoError::remote(Some(500), "server exploded"));

    let err = matrix.fetch(Field::Obs, "age").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!matrix.is_resident(Field::Obs, &Query::column("age")));

    let age = matrix.fetch(Field::Obs, "age").await.unwrap();
    assert_eq!(floats(&age, "age"), AGES.to_vec());
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn test_where_query_resolves_and_caches() {
    let (source, matrix) = common::loader();
    let query = Query::where_eq(Field::Var, "gene_id", "EGFR");

    let df = matrix.fetch(Field::X, query.clone()).await.unwrap();
    assert_eq!(df.labels(), vec!["2"]);
    assert_eq!(floats(&df, "2"), vec![20.0, 21.0, 22.0, 23.0, 24.0]);

    matrix.fetch(Field::X, query).await.unwrap();
    assert_eq!(source.request_count(), 1);
    // the resolved column is also reachable by label
    assert!(matrix.is_resident(Field::X, &Query::column("2")));
}

#[tokio::test]
async fn test_where_query_only_selects_x() {
    let (_, matrix) = common::loader();
    let err = matrix
        .fetch(Field::Obs, Query::where_eq(Field::Var, "gene_id", "EGFR"))
        .await
        .unwrap_err();
    assert!(matches!(err, AnnoError::InvariantViolation(_)));
}

#[tokio::test]
async fn test_row_subset_restricts_obs_and_x() {
    let (_, loader) = common::loader();
    let subset = AnnoMatrix::isubset(&loader, &[1, 3]).unwrap();
    assert_eq!(subset.n_obs(), 2);
    assert_eq!(subset.row_index().labels(), vec![1, 3]);

    let age = subset.fetch(Field::Obs, "age").await.unwrap();
    assert_eq!(floats(&age, "age"), vec![5.0, 50.0]);

    let x = subset.fetch(Field::X, "1").await.unwrap();
    assert_eq!(floats(&x, "1"), vec![11.0, 13.0]);

    // a subset of a subset keeps the persistent labels
    let nested = AnnoMatrix::isubset_mask(&subset, &[false, true]).unwrap();
    assert_eq!(nested.row_index().labels(), vec![3]);
    let age = nested.fetch(Field::Obs, "age").await.unwrap();
    assert_eq!(floats(&age, "age"), vec![50.0]);
}

#[tokio::test]
async fn test_var_is_never_row_subset() {
    let (_, loader) = common::loader();
    let subset = AnnoMatrix::isubset_mask(&loader, &[true, false, false, false, false]).unwrap();

    let var = subset.fetch(Field::Var, "gene_id").await.unwrap();
    assert_eq!(var.n_rows(), loader.n_var());
    assert_eq!(strings(&var, "gene_id"), GENES.to_vec());
    // passed through, not cached at the view
    assert!(!subset.is_resident(Field::Var, &Query::column("gene_id")));
    assert!(loader.is_resident(Field::Var, &Query::column("gene_id")));
}

#[tokio::test]
async fn test_views_share_loader_cache() {
    let (source, loader) = common::loader();
    loader.fetch(Field::Obs, "age").await.unwrap();

    let subset = AnnoMatrix::isubset(&loader, &[0, 2, 4]).unwrap();
    let age = subset.fetch(Field::Obs, "age").await.unwrap();
    assert_eq!(floats(&age, "age"), vec![1.0, 10.0, 99.0]);
    assert_eq!(source.request_count(), 1);
}

#[tokio::test]
async fn test_subset_rows_by_label() {
    let (_, loader) = common::loader();
    let subset = AnnoMatrix::subset_rows(&loader, vec![4, 0]).unwrap();
    let names = subset.fetch(Field::Obs, "name_0").await.unwrap();
    assert_eq!(strings(&names, "name_0"), vec!["c4", "c0"]);

    assert!(AnnoMatrix::subset_rows(&loader, vec![7]).is_err());
    assert!(AnnoMatrix::isubset_mask(&loader, &[true]).is_err());
}

#[tokio::test]
async fn test_inflight_fetch_lands_in_replaced_instance_only() {
    let gate = Arc::new(Notify::new());
    let (source, loader) = common::gated_loader(gate.clone());
    let subset = AnnoMatrix::isubset(&loader, &[0, 2, 4]).unwrap();

    let pending = tokio::spawn({
        let subset = subset.clone();
        async move { subset.fetch(Field::Obs, "age").await }
    });
    while source.request_count() == 0 {
        tokio::task::yield_now().await;
    }

    // edit while the load is held open; the edit produces fresh instances
    let replaced = subset.add_obs_anno_category("notes", "z").unwrap();
    gate.notify_one();
    let df = pending.await.unwrap().unwrap();
    assert_eq!(floats(&df, "age"), vec![1.0, 10.0, 99.0]);

    let age = Query::column("age");
    assert!(subset.is_resident(Field::Obs, &age));
    assert!(loader.is_resident(Field::Obs, &age));
    assert!(!replaced.is_resident(Field::Obs, &age));
    assert!(!replaced.view_of().unwrap().is_resident(Field::Obs, &age));
    assert_ne!(replaced.id(), subset.id());
}
