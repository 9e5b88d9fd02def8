use super::util::downcast;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::{MySqlPool, Row};

pub struct MySqlListingRepo {
    #[allow(dead_code)]
    pool: MySqlPool,
}

impl MySqlListingRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlListingRepo { pool }
    }
}

#[async_trait::async_trait]
impl ListingRepo for MySqlListingRepo {
    async fn get_card_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        listing_id: ListingId,
    ) -> Result<Option<ListingCard>, ChatError> {
        let tx = downcast(tx);

        let row = sqlx::query(
            r#"
SELECT listing_id, seller_id, title, price, thumb_file
FROM listing
WHERE listing_id = ?
"#,
        )
        .bind(listing_id)
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("query listing: {e}")))?;

        Ok(row.map(|row| ListingCard {
            listing_id: row.get::<ListingId, _>("listing_id"),
            seller_id: row.get::<MemberId, _>("seller_id"),
            title: row.get::<String, _>("title"),
            price: row.get::<Option<i64>, _>("price"),
            thumb_file: row.get::<Option<String>, _>("thumb_file"),
        }))
    }
}
