use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;

use crate::{
    domain::{
        entities::users::{InsertUserEntity, UserEntity},
        repositories::users::UserRepository,
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::users},
};

pub struct UserPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserRepository for UserPostgres {
    async fn upsert_by_email(&self, insert_user_entity: InsertUserEntity) -> Result<UserEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(users::table)
            .values(&insert_user_entity)
            .on_conflict(users::email)
            .do_nothing()
            .execute(&mut conn)?;

        let user = users::table
            .filter(users::email.eq(&insert_user_entity.email))
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let user = users::table
            .filter(users::email.eq(email))
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)
            .optional()?;

        Ok(user)
    }
}
