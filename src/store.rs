use std::future::IntoFuture;
use std::time::Duration;

use mongodb::{options::ClientOptions, Client, Collection, Database};

use crate::error::ApiError;
use crate::models::{AssignedTask, PersonalTask, User};

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    pub async fn init(uri: &str, db_name: &str) -> Self {
        let client_options = ClientOptions::parse(uri)
            .await
            .expect("Failed to parse MongoDB connection string");
        let client = Client::with_options(client_options).expect("Failed to initialize client");
        let db = client.database(db_name);
        MongoDB { client, db }
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection::<User>("users")
    }

    pub fn tasks(&self) -> Collection<PersonalTask> {
        self.db.collection::<PersonalTask>("tasks")
    }

    pub fn assigned_tasks(&self) -> Collection<AssignedTask> {
        self.db.collection::<AssignedTask>("assigned_tasks")
    }
}

/// Bounds a store call to `limit`. On elapse the operation fails with
/// `Timeout` and nothing further is written (each call is a single atomic
/// document operation, so there are no partial log writes to clean up).
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ApiError>
where
    F: IntoFuture<Output = Result<T, mongodb::error::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ApiError::from(err)),
        Err(_) => Err(ApiError::Timeout("store call exceeded time bound".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn with_timeout_passes_values_through() {
        let res = with_timeout(Duration::from_secs(1), async { Ok::<_, mongodb::error::Error>(7) })
            .await
            .unwrap();
        assert_eq!(res, 7);
    }

    #[actix_web::test]
    async fn with_timeout_maps_elapsed_to_timeout_error() {
        let res: Result<i32, ApiError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1)
        })
        .await;
        match res {
            Err(ApiError::Timeout(_)) => {}
            other => panic!("expected Timeout, got {:?}", other.map(|_| ())),
        }
    }
}
