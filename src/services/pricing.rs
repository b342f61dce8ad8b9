use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::product_variant::{self, Entity as ProductVariantEntity},
    errors::ServiceError,
};

/// A requested checkout line, before pricing.
#[derive(Debug, Clone, Copy)]
pub struct LineRequest {
    pub variant_id: Uuid,
    pub quantity: i32,
}

/// A priced checkout line with the catalog snapshot taken at pricing time.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub variant_id: Uuid,
    pub product_name: String,
    pub variant_name: String,
    pub quantity: i32,
    pub quantity_unit: String,
    pub unit_price: i64,
    pub subtotal: i64,
    pub image_url: Option<String>,
    /// Live stock at pricing time; informational only, the race-safe gate is
    /// the conditional decrement at order creation.
    pub stock: i32,
}

#[derive(Debug, Clone)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub subtotal: i64,
}

/// Prices requested lines against live variant data. Read-only on stock:
/// deduction happens only inside the order creation transaction.
#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn price_lines(&self, lines: &[LineRequest]) -> Result<PricedCart, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::NoItems);
        }
        // Quantity validation happens before any catalog lookup.
        if lines.iter().any(|line| line.quantity <= 0) {
            return Err(ServiceError::InvalidQuantity);
        }

        let mut priced = Vec::with_capacity(lines.len());
        let mut subtotal: i64 = 0;

        for line in lines {
            let variant = ProductVariantEntity::find()
                .filter(product_variant::Column::Id.eq(line.variant_id))
                .one(&*self.db)
                .await?
                .ok_or(ServiceError::VariantNotFound(line.variant_id))?;

            let line_subtotal = variant.price * i64::from(line.quantity);
            subtotal += line_subtotal;

            priced.push(PricedLine {
                variant_id: variant.id,
                product_name: variant.product_name,
                variant_name: variant.name,
                quantity: line.quantity,
                quantity_unit: variant.quantity_unit,
                unit_price: variant.price,
                subtotal: line_subtotal,
                image_url: variant.image_url,
                stock: variant.stock,
            });
        }

        Ok(PricedCart {
            lines: priced,
            subtotal,
        })
    }
}
