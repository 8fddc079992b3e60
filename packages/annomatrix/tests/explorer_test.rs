mod common;

use annomatrix::{
    ClipRange, Crossfilter, Explorer, ExplorerDefaults, ExplorerEvent, Field, Query, Selection,
};
use common::{floats, strings};
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(rx: &mut UnboundedReceiver<ExplorerEvent>) -> Vec<ExplorerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_crossfilter_and_across_dimensions() {
    let (_, loader) = common::loader();
    let xfltr = Crossfilter::new(loader.clone());
    assert_eq!(xfltr.count_selected(), 5);

    let xfltr = xfltr
        .select(Field::Obs, "louvain", Selection::Exact(vec!["a".into()]))
        .await
        .unwrap();
    assert_eq!(xfltr.all_selected_mask(), vec![true, false, true, false, true]);

    let xfltr = xfltr
        .select(Field::Obs, "age", Selection::Ranges(vec![(0.0, 20.0)]))
        .await
        .unwrap();
    assert_eq!(xfltr.all_selected_labels(), vec![0, 2]);

    let xfltr = xfltr.deselect(&Crossfilter::dimension_name(Field::Obs, &Query::column("louvain")));
    assert_eq!(xfltr.all_selected_labels(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_crossfilter_invert_flips_one_dimension() {
    let (_, loader) = common::loader();
    let louvain = Crossfilter::dimension_name(Field::Obs, &Query::column("louvain"));
    let age = Crossfilter::dimension_name(Field::Obs, &Query::column("age"));
    let xfltr = Crossfilter::new(loader)
        .select(Field::Obs, "louvain", Selection::Exact(vec!["a".into()]))
        .await
        .unwrap()
        .select(Field::Obs, "age", Selection::Ranges(vec![(0.0, 20.0)]))
        .await
        .unwrap();
    assert_eq!(xfltr.all_selected_mask(), vec![true, false, true, false, false]);

    let inverted = xfltr.invert(&louvain).unwrap();
    assert_eq!(inverted.all_selected_mask(), vec![false, true, false, false, false]);
    assert_eq!(
        inverted.selection(&louvain),
        Some(&Selection::Not(Box::new(Selection::Exact(vec!["a".into()]))))
    );
    assert_eq!(inverted.selection(&age), xfltr.selection(&age));
    assert_eq!(
        inverted.dimension_names().collect::<Vec<_>>(),
        xfltr.dimension_names().collect::<Vec<_>>()
    );

    let restored = inverted.invert(&louvain).unwrap();
    assert_eq!(restored.all_selected_mask(), xfltr.all_selected_mask());
    assert_eq!(restored.selection(&louvain), xfltr.selection(&louvain));

    assert!(xfltr.invert("unknown").is_err());
}

#[tokio::test]
async fn test_explorer_invert_selection() {
    let (_, loader) = common::loader();
    let (mut explorer, mut rx) = Explorer::new(loader, ExplorerDefaults::default()).unwrap();
    drain(&mut rx);

    explorer.select_rows("lasso", vec![0, 1]).unwrap();
    explorer.invert_selection("lasso").unwrap();
    assert_eq!(explorer.crossfilter().all_selected_labels(), vec![2, 3, 4]);
    assert!(explorer.invert_selection("brush").is_err());

    let events = drain(&mut rx);
    assert_eq!(
        events[..2],
        [
            ExplorerEvent::SelectionChanged {
                dimension: "lasso".into(),
                selected: 2
            },
            ExplorerEvent::SelectionChanged {
                dimension: "lasso".into(),
                selected: 3
            },
        ]
    );
    assert!(matches!(events[2], ExplorerEvent::Error { .. }));
}

#[tokio::test]
async fn test_crossfilter_rejects_var_and_multi_column() {
    let (_, loader) = common::loader();
    let xfltr = Crossfilter::new(loader);
    assert!(xfltr.select(Field::Var, "gene_id", Selection::All).await.is_err());
    assert!(xfltr
        .select(Field::Obs, Query::columns(["age", "louvain"]), Selection::All)
        .await
        .is_err());
}

#[tokio::test]
async fn test_select_on_expression() {
    let (_, loader) = common::loader();
    let xfltr = Crossfilter::new(loader)
        .select(
            Field::X,
            Query::where_eq(Field::Var, "gene_id", "BRCA1"),
            Selection::Ranges(vec![(12.0, 100.0)]),
        )
        .await
        .unwrap();
    assert_eq!(xfltr.all_selected_labels(), vec![2, 3, 4]);
}

#[tokio::test]
async fn test_subset_and_reset_session() {
    let (_, loader) = common::loader();
    let (mut explorer, mut rx) = Explorer::new(loader, ExplorerDefaults::default()).unwrap();
    assert_eq!(drain(&mut rx), vec![ExplorerEvent::InitComplete { n_obs: 5, n_var: 3 }]);

    explorer.clip(0.2, 0.8).unwrap();
    explorer.select_rows("lasso", vec![0, 1, 2]).unwrap();
    explorer.subset().unwrap();
    assert_eq!(explorer.matrix().view_chain(), vec!["clip", "row-subset", "loader"]);
    assert_eq!(explorer.crossfilter().count_selected(), 3);

    // clip is recomputed over the remaining rows: bounds 1 and 10 keep all three
    let age = floats(&explorer.matrix().fetch(Field::Obs, "age").await.unwrap(), "age");
    assert_eq!(age, vec![1.0, 5.0, 10.0]);

    explorer.reset_subset().unwrap();
    assert_eq!(explorer.matrix().view_chain(), vec!["clip", "loader"]);
    assert_eq!(explorer.clip_quantiles(), ClipRange { min: 0.2, max: 0.8 });

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            ExplorerEvent::ClipQuantiles { min: 0.2, max: 0.8 },
            ExplorerEvent::SelectionChanged {
                dimension: "lasso".into(),
                selected: 3
            },
            ExplorerEvent::SubsetToSelection { n_obs: 3 },
            ExplorerEvent::ResetSubset { n_obs: 5 },
        ]
    );
}

#[tokio::test]
async fn test_failed_action_emits_error_and_keeps_state() {
    let (_, loader) = common::loader();
    let (mut explorer, mut rx) = Explorer::new(loader, ExplorerDefaults::default()).unwrap();
    drain(&mut rx);
    let before = explorer.matrix().id();

    assert!(explorer.clip(0.9, 0.1).is_err());
    assert!(explorer.select_categorical("nope", vec![]).await.is_err());
    assert_eq!(explorer.matrix().id(), before);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, ExplorerEvent::Error { .. })));
}

#[tokio::test]
async fn test_annotation_session() {
    let (_, loader) = common::loader();
    let (mut explorer, mut rx) = Explorer::new(loader, ExplorerDefaults::default()).unwrap();
    assert!(!explorer.needs_save());

    explorer.create_category("cell_type").unwrap();
    explorer.create_label("cell_type", "T cell").unwrap();
    explorer.select_categorical("louvain", vec!["b".into()]).await.unwrap();
    explorer.label_selection("cell_type", "T cell").await.unwrap();
    assert!(explorer.needs_save());
    // the louvain selection survives the edit
    assert_eq!(explorer.crossfilter().all_selected_labels(), vec![1, 3]);

    let df = explorer.matrix().fetch(Field::Obs, "cell_type").await.unwrap();
    assert_eq!(
        strings(&df, "cell_type"),
        vec!["unassigned", "T cell", "unassigned", "T cell", "unassigned"]
    );

    explorer.rename_label("cell_type", "T cell", "NK cell").await.unwrap();
    explorer.rename_category("cell_type", "kind").await.unwrap();
    let df = explorer.matrix().fetch(Field::Obs, "kind").await.unwrap();
    assert_eq!(strings(&df, "kind")[1], "NK cell");

    explorer.delete_label("kind", "NK cell").await.unwrap();
    let df = explorer.matrix().fetch(Field::Obs, "kind").await.unwrap();
    assert_eq!(strings(&df, "kind"), vec!["unassigned"; 5]);

    explorer.delete_category("kind").unwrap();
    assert!(!explorer.matrix().schema().has_column(Field::Obs, "kind"));

    explorer.mark_saved();
    assert!(!explorer.needs_save());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ExplorerEvent::AnnotationChanged { action: "label-selection", .. })));
}

#[tokio::test]
async fn test_configured_clip_applied_at_start() {
    let (_, loader) = common::loader();
    let defaults = ExplorerDefaults {
        clip_quantiles: ClipRange { min: 0.2, max: 0.8 },
        ..ExplorerDefaults::default()
    };
    let (explorer, _rx) = Explorer::new(loader, defaults).unwrap();
    assert!(explorer.matrix().is_clipped());
}
