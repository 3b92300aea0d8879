use crate::{
    db::DbPool,
    entities::{
        bom, bom::Entity as Bom, bom_item, bom_item::Entity as BomItem,
        product::Entity as Product, ProductType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use futures::future::BoxFuture;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

/// One line of a new BOM.
#[derive(Debug, Clone)]
pub struct BomItemInput {
    pub material_id: i32,
    pub quantity: Decimal,
    pub unit: String,
}

/// Input for creating a BOM revision.
#[derive(Debug, Clone)]
pub struct CreateBomInput {
    pub product_id: i32,
    /// Revision label; defaults to "1.0".
    pub version: Option<String>,
    pub items: Vec<BomItemInput>,
    /// When set, the new BOM becomes the product's active revision and any
    /// previously active revision is deactivated in the same transaction.
    pub activate: bool,
}

/// Leaf material requirement produced by BOM explosion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialRequirement {
    pub material_id: i32,
    pub quantity: Decimal,
    pub unit: String,
}

/// Bill-of-materials management and explosion.
pub struct BomService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl BomService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a BOM revision with its items. A product may hold many
    /// revisions but at most one active one; activation here swaps the
    /// active revision atomically.
    #[instrument(skip(self, input), fields(product_id = input.product_id))]
    pub async fn create_bom(&self, input: CreateBomInput) -> Result<bom::Model, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "A BOM needs at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "BOM item quantity for material {} must be positive",
                    item.material_id
                )));
            }
            if item.material_id == input.product_id {
                return Err(ServiceError::CyclicBom {
                    product_id: input.product_id,
                });
            }
        }

        let txn = self.db_pool.begin().await?;

        let parent = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {}", input.product_id)))?;
        if parent.product_type == ProductType::RawMaterial {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is a raw material and cannot have a BOM",
                parent.code
            )));
        }
        for item in &input.items {
            Product::find_by_id(item.material_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Material {}", item.material_id)))?;
        }

        if input.activate {
            deactivate_active_boms(&txn, input.product_id).await?;
        }

        let created = bom::ActiveModel {
            product_id: Set(input.product_id),
            version: Set(input.version.unwrap_or_else(|| "1.0".to_string())),
            is_active: Set(input.activate),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for item in input.items {
            bom_item::ActiveModel {
                bom_id: Set(created.id),
                material_id: Set(item.material_id),
                quantity: Set(item.quantity),
                unit: Set(item.unit),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::BomCreated {
                bom_id: created.id,
                product_id: created.product_id,
            })
            .await;
        if created.is_active {
            self.event_sender
                .send_or_log(Event::BomActivated {
                    bom_id: created.id,
                    product_id: created.product_id,
                })
                .await;
        }

        Ok(created)
    }

    /// Makes the given revision the product's single active BOM.
    #[instrument(skip(self))]
    pub async fn activate_bom(&self, bom_id: i32) -> Result<bom::Model, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let revision = Bom::find_by_id(bom_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {}", bom_id)))?;
        if revision.is_active {
            txn.commit().await?;
            return Ok(revision);
        }

        deactivate_active_boms(&txn, revision.product_id).await?;
        let mut active: bom::ActiveModel = revision.into();
        active.is_active = Set(true);
        let activated = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::BomActivated {
                bom_id: activated.id,
                product_id: activated.product_id,
            })
            .await;

        Ok(activated)
    }

    /// The product's active BOM and its items, if any.
    #[instrument(skip(self))]
    pub async fn get_active_bom(
        &self,
        product_id: i32,
    ) -> Result<Option<(bom::Model, Vec<bom_item::Model>)>, ServiceError> {
        let db = self.db_pool.as_ref();
        let Some(active) = find_active_bom(db, product_id).await? else {
            return Ok(None);
        };
        let items = BomItem::find()
            .filter(bom_item::Column::BomId.eq(active.id))
            .order_by_asc(bom_item::Column::Id)
            .all(db)
            .await?;
        Ok(Some((active, items)))
    }

    /// Explodes the product's active BOM into leaf material requirements
    /// for the given build quantity.
    ///
    /// Sub-assemblies (component-type products with their own active BOM)
    /// are expanded recursively; only leaves appear in the result, with
    /// quantities merged per material. A product reached twice along one
    /// expansion path aborts the explosion with [`ServiceError::CyclicBom`].
    #[instrument(skip(self))]
    pub async fn explode(
        &self,
        product_id: i32,
        quantity: Decimal,
    ) -> Result<Vec<MaterialRequirement>, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Explosion quantity must be positive".to_string(),
            ));
        }

        explode_product(self.db_pool.as_ref(), product_id, quantity).await
    }
}

/// Explosion entry point shared with the production service.
pub(crate) async fn explode_product(
    db: &DatabaseConnection,
    product_id: i32,
    quantity: Decimal,
) -> Result<Vec<MaterialRequirement>, ServiceError> {
    let mut path = vec![product_id];
    let mut requirements = BTreeMap::new();
    collect_requirements(db, product_id, quantity, &mut path, &mut requirements).await?;

    Ok(requirements
        .into_iter()
        .map(|(material_id, (quantity, unit))| MaterialRequirement {
            material_id,
            quantity,
            unit,
        })
        .collect())
}

async fn find_active_bom(
    db: &DatabaseConnection,
    product_id: i32,
) -> Result<Option<bom::Model>, ServiceError> {
    let active = Bom::find()
        .filter(bom::Column::ProductId.eq(product_id))
        .filter(bom::Column::IsActive.eq(true))
        .one(db)
        .await?;
    Ok(active)
}

async fn deactivate_active_boms<C: sea_orm::ConnectionTrait>(
    conn: &C,
    product_id: i32,
) -> Result<(), ServiceError> {
    let active = Bom::find()
        .filter(bom::Column::ProductId.eq(product_id))
        .filter(bom::Column::IsActive.eq(true))
        .all(conn)
        .await?;
    for revision in active {
        let mut inactive: bom::ActiveModel = revision.into();
        inactive.is_active = Set(false);
        inactive.update(conn).await?;
    }
    Ok(())
}

/// Recursive step of the explosion. `path` holds the products currently
/// being expanded, root first, and doubles as the cycle detector.
fn collect_requirements<'a>(
    db: &'a DatabaseConnection,
    product_id: i32,
    quantity: Decimal,
    path: &'a mut Vec<i32>,
    acc: &'a mut BTreeMap<i32, (Decimal, String)>,
) -> BoxFuture<'a, Result<(), ServiceError>> {
    Box::pin(async move {
        let active = find_active_bom(db, product_id)
            .await?
            .ok_or(ServiceError::NoActiveBom { product_id })?;

        let items = BomItem::find()
            .filter(bom_item::Column::BomId.eq(active.id))
            .order_by_asc(bom_item::Column::Id)
            .all(db)
            .await?;

        for item in items {
            if path.contains(&item.material_id) {
                return Err(ServiceError::CyclicBom {
                    product_id: item.material_id,
                });
            }

            let material = Product::find_by_id(item.material_id)
                .one(db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Material {}", item.material_id)))?;
            let required = item.quantity * quantity;

            let expandable = material.product_type == ProductType::Component
                && find_active_bom(db, material.id).await?.is_some();
            if expandable {
                path.push(material.id);
                collect_requirements(db, material.id, required, path, acc).await?;
                path.pop();
            } else {
                let entry = acc
                    .entry(material.id)
                    .or_insert_with(|| (Decimal::ZERO, material.unit.clone()));
                entry.0 += required;
            }
        }

        Ok(())
    })
}
