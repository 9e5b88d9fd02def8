use super::util::downcast;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::{MySqlPool, Row};

pub struct MySqlMemberRepo {
    #[allow(dead_code)]
    pool: MySqlPool,
}

impl MySqlMemberRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlMemberRepo { pool }
    }
}

#[async_trait::async_trait]
impl MemberRepo for MySqlMemberRepo {
    async fn get_profile_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        member_id: MemberId,
    ) -> Result<Option<MemberProfile>, ChatError> {
        let tx = downcast(tx);

        let row = sqlx::query(
            r#"
SELECT member_id, nickname, email, avatar_file
FROM member
WHERE member_id = ? AND is_active = 1
"#,
        )
        .bind(member_id)
        .fetch_optional(tx.conn())
        .await
        .map_err(|e| ChatError::Store(format!("query member profile: {e}")))?;

        Ok(row.map(|row| MemberProfile {
            member_id: row.get::<MemberId, _>("member_id"),
            nickname: row.get::<String, _>("nickname"),
            email: row.get::<Option<String>, _>("email"),
            avatar_file: row.get::<Option<String>, _>("avatar_file"),
        }))
    }
}
