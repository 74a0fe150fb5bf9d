mod common;

use assert_matches::assert_matches;
use common::{option_id, TestCatalog};
use stateset_catalog::{
    entities::catalog::{Product, ProductConfiguration, ProductItem, Variation, VariationOption},
    events::Event,
    services::catalog::{
        CreateVariationOptionsRequest, CreateVariationRequest, UpdateVariationOptionRequest,
        UpdateVariationRequest,
    },
    ErrorKind, SavePolicy, ServiceError,
};
use uuid::Uuid;

#[tokio::test]
async fn create_variation_collapses_duplicate_values() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;

    let created = catalog
        .engine()
        .create_variation(CreateVariationRequest {
            category_id: shoes.id,
            name: "Size".to_string(),
            value: None,
            values: vec!["9".into(), "10".into(), "10".into()],
        })
        .await
        .unwrap();

    let values: Vec<&str> = created.options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values, vec!["10", "9"]);
    assert!(created
        .options
        .iter()
        .all(|o| o.variation_id == created.variation.id));
    assert_eq!(catalog.count(Variation).await, 1);
    assert_eq!(catalog.count(VariationOption).await, 2);
}

#[tokio::test]
async fn singular_value_merges_with_plural_values() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;

    let created = catalog
        .engine()
        .create_variation(CreateVariationRequest {
            category_id: shoes.id,
            name: " Color ".to_string(),
            value: Some("Red".into()),
            values: vec!["Blue".into(), "Red".into()],
        })
        .await
        .unwrap();

    assert_eq!(created.variation.name, "Color");
    assert_eq!(created.options.len(), 2);
}

#[tokio::test]
async fn variations_attach_only_to_leaf_categories() {
    let catalog = TestCatalog::new().await;
    let apparel = catalog.root_category("Apparel").await;
    catalog.child_category(apparel.id, "Shirts").await;

    let err = catalog
        .engine()
        .create_variation(CreateVariationRequest {
            category_id: apparel.id,
            name: "Size".into(),
            value: Some("M".into()),
            values: vec![],
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(catalog.count(Variation).await, 0);
}

#[tokio::test]
async fn unknown_category_is_not_found() {
    let catalog = TestCatalog::new().await;

    let err = catalog
        .engine()
        .create_variation(CreateVariationRequest {
            category_id: Uuid::new_v4(),
            name: "Size".into(),
            value: Some("M".into()),
            values: vec![],
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn creating_a_taken_variation_name_conflicts() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    catalog.variation(shoes.id, "Size", &["9"]).await;

    let err = catalog
        .engine()
        .create_variation(CreateVariationRequest {
            category_id: shoes.id,
            name: "Size".into(),
            value: Some("11".into()),
            values: vec![],
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Conflict(_));
    assert_eq!(catalog.count(VariationOption).await, 1);
}

#[tokio::test]
async fn duplicate_option_values_conflict() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let size = catalog.variation(shoes.id, "Size", &["9", "10"]).await;

    let err = catalog
        .engine()
        .create_variation_options(CreateVariationOptionsRequest {
            variation_id: size.variation.id,
            value: None,
            values: vec!["11".into(), "10".into()],
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    // "11" must not be left behind by the failed batch
    assert_eq!(catalog.count(VariationOption).await, 2);

    let added = catalog
        .engine()
        .create_variation_options(CreateVariationOptionsRequest {
            variation_id: size.variation.id,
            value: Some("11".into()),
            values: vec![],
        })
        .await
        .unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(
        catalog
            .engine()
            .variation_options(size.variation.id)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn blank_values_are_rejected() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;

    let err = catalog
        .engine()
        .create_variation(CreateVariationRequest {
            category_id: shoes.id,
            name: "Size".into(),
            value: Some("  ".into()),
            values: vec!["9".into()],
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = catalog
        .engine()
        .create_variation(CreateVariationRequest {
            category_id: shoes.id,
            name: "Size".into(),
            value: None,
            values: vec![],
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn deleting_an_unused_option_leaves_products_alone() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red", "Blue"]).await;
    catalog.product(shoes.id, "Runner", &[&[("Color", "Red")]]).await;

    let report = catalog
        .engine()
        .delete_variation_option(option_id(&color, "Blue"), SavePolicy::Preserve)
        .await
        .unwrap();

    assert_eq!(report.variation_options.len(), 1);
    assert!(report.product_configurations.is_empty());
    assert!(report.product_items.is_empty());
    assert!(report.products.is_empty());
    assert!(report.variation.is_none());
    assert_eq!(catalog.count(ProductItem).await, 1);
}

#[tokio::test]
async fn shared_items_only_lose_the_configuration() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red"]).await;
    catalog.variation(shoes.id, "Size", &["10"]).await;
    let product = catalog
        .product(shoes.id, "Runner", &[&[("Color", "Red"), ("Size", "10")]])
        .await;
    let item_id = product.items[0].item.id;

    let report = catalog
        .engine()
        .delete_variation_option(option_id(&color, "Red"), SavePolicy::Preserve)
        .await
        .unwrap();

    assert_eq!(report.product_configurations.len(), 1);
    assert!(report.product_items.is_empty());
    // Red was Color's last option
    assert_eq!(
        report.variation.as_ref().map(|v| v.id),
        Some(color.variation.id)
    );
    assert_eq!(
        catalog.products().item_option_ids(item_id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn exclusive_item_blocks_delete_under_preserve() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red", "Blue"]).await;
    let product = catalog.product(shoes.id, "Runner", &[&[("Color", "Red")]]).await;
    let item_id = product.items[0].item.id;
    let red = option_id(&color, "Red");

    let before = catalog.snapshot().await;
    let err = catalog
        .engine()
        .delete_variation_option(red, SavePolicy::Preserve)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.blocking_product_items(), &[item_id]);
    assert!(err.to_string().contains(&item_id.to_string()));
    assert_eq!(catalog.snapshot().await, before);
    assert_eq!(
        catalog.products().item_option_ids(item_id).await.unwrap(),
        vec![red]
    );
}

#[tokio::test]
async fn exclusive_item_and_emptied_product_go_under_discard() {
    let mut catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red", "Blue"]).await;
    let runner = catalog.product(shoes.id, "Runner", &[&[("Color", "Red")]]).await;
    let walker = catalog
        .product(shoes.id, "Walker", &[&[("Color", "Red")], &[("Color", "Blue")]])
        .await;
    catalog.drain_events();

    let report = catalog
        .engine()
        .delete_variation_option(option_id(&color, "Red"), SavePolicy::Discard)
        .await
        .unwrap();

    assert_eq!(report.product_items.len(), 2);
    assert_eq!(report.product_configurations.len(), 2);
    let deleted_products: Vec<Uuid> = report.products.iter().map(|p| p.id).collect();
    assert_eq!(deleted_products, vec![runner.product.id]);
    assert!(report.variation.is_none());

    assert_eq!(catalog.count(Product).await, 1);
    assert_eq!(
        catalog
            .products()
            .product_items(walker.product.id)
            .await
            .unwrap()
            .len(),
        1
    );

    let events = catalog.drain_events();
    assert_matches!(
        events.as_slice(),
        [Event::CatalogPurged { report: published }] if *published == report
    );
}

#[tokio::test]
async fn deleting_a_variation_twice_is_not_found() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let size = catalog.variation(shoes.id, "Size", &["9", "10"]).await;
    catalog.product(shoes.id, "Runner", &[&[("Size", "9")]]).await;

    let report = catalog
        .engine()
        .delete_variation(size.variation.id, SavePolicy::Discard)
        .await
        .unwrap();
    assert_eq!(
        report.variation.map(|v| v.id),
        Some(size.variation.id)
    );
    assert_eq!(report.variation_options.len(), 2);
    assert_eq!(report.products.len(), 1);

    let err = catalog
        .engine()
        .delete_variation(size.variation.id, SavePolicy::Discard)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    assert_eq!(
        catalog.snapshot().await,
        [1, 0, 0, 0, 0, 0],
        "only the category survives"
    );
}

#[tokio::test]
async fn deleting_a_variation_with_exclusive_items_is_refused_under_preserve() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let size = catalog.variation(shoes.id, "Size", &["9", "10"]).await;
    catalog.product(shoes.id, "Runner", &[&[("Size", "9")], &[("Size", "10")]]).await;

    let before = catalog.snapshot().await;
    let err = catalog
        .engine()
        .delete_variation(size.variation.id, SavePolicy::Preserve)
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::CascadeRefused { ref product_item_ids, .. } if product_item_ids.len() == 2
    );
    assert_eq!(catalog.snapshot().await, before);
}

#[tokio::test]
async fn renaming_into_a_taken_value_evicts_under_discard() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog
        .variation(shoes.id, "Color", &["Red", "Crimson", "Blue"])
        .await;
    let product = catalog
        .product(shoes.id, "Runner", &[&[("Color", "Red")], &[("Color", "Blue")]])
        .await;
    let red_item = product.items[0].item.id;
    let crimson = option_id(&color, "Crimson");
    let red = option_id(&color, "Red");

    let updated = catalog
        .engine()
        .update_variation_option(UpdateVariationOptionRequest {
            option_id: crimson,
            value: Some("Red".into()),
            variation_id: None,
            save: SavePolicy::Discard,
        })
        .await
        .unwrap();

    assert_eq!(updated.option.id, crimson);
    assert_eq!(updated.option.value, "Red");
    let evicted: Vec<Uuid> = updated
        .incompatibilities
        .variation_options
        .iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(evicted, vec![red]);
    let removed_items: Vec<Uuid> = updated
        .incompatibilities
        .product_items
        .iter()
        .map(|i| i.id)
        .collect();
    assert_eq!(removed_items, vec![red_item]);
    // The product still has its Blue item
    assert!(updated.incompatibilities.products.is_empty());
    assert!(updated.incompatibilities.variation.is_none());

    let values: Vec<String> = catalog
        .engine()
        .variation_options(color.variation.id)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.value)
        .collect();
    assert_eq!(values, vec!["Blue".to_string(), "Red".to_string()]);
}

#[tokio::test]
async fn renaming_into_a_taken_value_conflicts_under_preserve() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red", "Crimson"]).await;
    let crimson = option_id(&color, "Crimson");

    let before = catalog.snapshot().await;
    let err = catalog
        .engine()
        .update_variation_option(UpdateVariationOptionRequest {
            option_id: crimson,
            value: Some("Red".into()),
            variation_id: None,
            save: SavePolicy::Preserve,
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Conflict(_));
    assert_eq!(catalog.snapshot().await, before);
    let options = catalog
        .engine()
        .variation_options(color.variation.id)
        .await
        .unwrap();
    assert!(options
        .iter()
        .any(|o| o.id == crimson && o.value == "Crimson"));
}

#[tokio::test]
async fn moving_an_option_to_an_unknown_variation_is_not_found() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red", "Crimson"]).await;
    let crimson = option_id(&color, "Crimson");

    let err = catalog
        .engine()
        .update_variation_option(UpdateVariationOptionRequest {
            option_id: crimson,
            value: Some("Red".into()),
            variation_id: Some(Uuid::new_v4()),
            save: SavePolicy::Discard,
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::NotFound(_));
    assert_eq!(catalog.count(VariationOption).await, 2);
}

#[tokio::test]
async fn moving_an_option_evicts_in_the_destination_variation() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red", "Blue"]).await;
    let finish = catalog.variation(shoes.id, "Finish", &["Red"]).await;

    let updated = catalog
        .engine()
        .update_variation_option(UpdateVariationOptionRequest {
            option_id: option_id(&color, "Red"),
            value: None,
            variation_id: Some(finish.variation.id),
            save: SavePolicy::Discard,
        })
        .await
        .unwrap();

    assert_eq!(updated.option.variation_id, finish.variation.id);
    assert_eq!(updated.incompatibilities.variation_options.len(), 1);
    // The destination keeps existing even though its only option was evicted
    assert!(updated.incompatibilities.variation.is_none());
    assert_eq!(catalog.count(Variation).await, 2);
}

#[tokio::test]
async fn update_option_without_fields_is_invalid() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let color = catalog.variation(shoes.id, "Color", &["Red"]).await;

    let err = catalog
        .engine()
        .update_variation_option(UpdateVariationOptionRequest {
            option_id: option_id(&color, "Red"),
            value: None,
            variation_id: None,
            save: SavePolicy::Preserve,
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn renaming_a_variation_evicts_the_holder_of_the_name() {
    let mut catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let size = catalog.variation(shoes.id, "Size", &["9"]).await;
    let fit = catalog.variation(shoes.id, "Fit", &["Wide"]).await;
    catalog.product(shoes.id, "Runner", &[&[("Size", "9")]]).await;
    catalog.drain_events();

    let updated = catalog
        .engine()
        .update_variation(UpdateVariationRequest {
            variation_id: fit.variation.id,
            name: Some("Size".into()),
            category_id: None,
            save: SavePolicy::Discard,
        })
        .await
        .unwrap();

    assert_eq!(updated.variation.name, "Size");
    assert_eq!(
        updated.incompatibilities.variation.as_ref().map(|v| v.id),
        Some(size.variation.id)
    );
    assert_eq!(updated.incompatibilities.products.len(), 1);
    assert_eq!(catalog.count(ProductConfiguration).await, 0);

    let events = catalog.drain_events();
    assert_eq!(events.len(), 2);
    assert_matches!(events[0], Event::CatalogPurged { .. });
    assert_matches!(
        events[1],
        Event::VariationUpdated { variation_id, .. } if variation_id == fit.variation.id
    );
}

#[tokio::test]
async fn renaming_a_variation_to_a_taken_name_conflicts_under_preserve() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    catalog.variation(shoes.id, "Size", &["9"]).await;
    let fit = catalog.variation(shoes.id, "Fit", &["Wide"]).await;

    let err = catalog
        .engine()
        .update_variation(UpdateVariationRequest {
            variation_id: fit.variation.id,
            name: Some("Size".into()),
            category_id: None,
            save: SavePolicy::Preserve,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(catalog.count(Variation).await, 2);
}

#[tokio::test]
async fn keeping_the_same_name_is_not_a_collision() {
    let catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let size = catalog.variation(shoes.id, "Size", &["9"]).await;

    let updated = catalog
        .engine()
        .update_variation(UpdateVariationRequest {
            variation_id: size.variation.id,
            name: Some("Size".into()),
            category_id: None,
            save: SavePolicy::Preserve,
        })
        .await
        .unwrap();

    assert!(updated.incompatibilities.is_empty());
}

#[tokio::test]
async fn moving_a_variation_requires_a_leaf_destination() {
    let catalog = TestCatalog::new().await;
    let apparel = catalog.root_category("Apparel").await;
    let shirts = catalog.child_category(apparel.id, "Shirts").await;
    let shoes = catalog.root_category("Shoes").await;
    let size = catalog.variation(shirts.id, "Size", &["M"]).await;

    let err = catalog
        .engine()
        .update_variation(UpdateVariationRequest {
            variation_id: size.variation.id,
            name: None,
            category_id: Some(apparel.id),
            save: SavePolicy::Preserve,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let moved = catalog
        .engine()
        .update_variation(UpdateVariationRequest {
            variation_id: size.variation.id,
            name: None,
            category_id: Some(shoes.id),
            save: SavePolicy::Preserve,
        })
        .await
        .unwrap();
    assert_eq!(moved.variation.category_id, shoes.id);
    assert_eq!(
        catalog
            .engine()
            .category_variations(shoes.id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn update_variation_without_fields_is_invalid() {
    let catalog = TestCatalog::new().await;

    let err = catalog
        .engine()
        .update_variation(UpdateVariationRequest {
            variation_id: Uuid::new_v4(),
            name: None,
            category_id: None,
            save: SavePolicy::Preserve,
        })
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn mutations_publish_events_after_commit() {
    let mut catalog = TestCatalog::new().await;
    let shoes = catalog.root_category("Shoes").await;
    let size = catalog.variation(shoes.id, "Size", &["9", "10"]).await;
    catalog
        .engine()
        .create_variation_options(CreateVariationOptionsRequest {
            variation_id: size.variation.id,
            value: Some("11".into()),
            values: vec![],
        })
        .await
        .unwrap();
    // Failed mutations publish nothing
    let _ = catalog
        .engine()
        .create_variation_options(CreateVariationOptionsRequest {
            variation_id: size.variation.id,
            value: Some("11".into()),
            values: vec![],
        })
        .await
        .unwrap_err();

    let names: Vec<&str> = catalog.drain_events().iter().map(Event::name).collect();
    assert_eq!(
        names,
        vec![
            "category_created",
            "variation_created",
            "variation_options_created"
        ]
    );
}

#[tokio::test]
async fn a_full_event_channel_does_not_stall_mutations() {
    let catalog = TestCatalog::with_event_capacity(1).await;
    // Fills the only slot; nothing drains it
    let shoes = catalog.root_category("Shoes").await;

    let created = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        catalog.engine().create_variation(CreateVariationRequest {
            category_id: shoes.id,
            name: "Size".to_string(),
            value: None,
            values: vec!["9".to_string(), "10".to_string()],
        }),
    )
    .await
    .expect("create_variation waited on the event channel")
    .unwrap();
    assert_eq!(created.options.len(), 2);

    let product = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        catalog.product(shoes.id, "Runner", &[&[("Size", "9")]]),
    )
    .await
    .expect("create_product waited on the event channel");
    assert_eq!(product.items.len(), 1);
}
