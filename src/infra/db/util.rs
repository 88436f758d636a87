use crate::application::repos::StoreError;

pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to statement timeout")
                || db
                    .message()
                    .contains("canceling statement due to user request") =>
        {
            StoreError::Timeout
        }
        sqlx::Error::ColumnDecode { source, .. } => StoreError::decode(source),
        sqlx::Error::Decode(source) => StoreError::decode(source),
        other => StoreError::from_persistence(other),
    }
}
