#[cfg(test)]
pub mod test_console {
    use crate::auth::{CredentialAuthenticator, Role, SharedAuthenticator};
    use crate::config::{Account, AttendancePolicy, SyncPolicy};
    use crate::db::{apply_schema, connect};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::ops;
    use crate::store::{EntityStore, Snapshot};
    use crate::sync::{SqliteSyncSink, SyncQueue, SyncSink, SyncState, SyncTicket};
    use crate::Console;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use std::sync::{Arc, Once};
    use std::time::Duration;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";
    pub static ADMIN_EMAIL: &str = "admin@example.edu";
    pub static PRINCIPAL_EMAIL: &str = "principal@example.edu";

    pub fn init_test_tracing() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter("debug")
                .with_test_writer()
                .try_init();
        });
    }

    pub fn fast_sync() -> SyncPolicy {
        SyncPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        }
    }

    pub struct TestConsoleBuilder {
        accounts: Vec<(String, Role, String)>,
        snapshot: Snapshot,
        attendance: AttendancePolicy,
        sink: Option<Arc<dyn SyncSink>>,
    }

    impl Default for TestConsoleBuilder {
        fn default() -> Self {
            Self {
                accounts: Vec::new(),
                snapshot: Snapshot::default(),
                attendance: AttendancePolicy::default(),
                sink: None,
            }
        }
    }

    impl TestConsoleBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(mut self, email: &str) -> Self {
            self.accounts
                .push((email.to_string(), Role::Admin, STANDARD_PASSWORD.to_string()));
            self
        }

        pub fn principal(mut self, email: &str) -> Self {
            self.accounts.push((
                email.to_string(),
                Role::Principal,
                STANDARD_PASSWORD.to_string(),
            ));
            self
        }

        pub fn account_with_password(mut self, email: &str, role: Role, password: &str) -> Self {
            self.accounts
                .push((email.to_string(), role, password.to_string()));
            self
        }

        pub fn organization(mut self, name: &str) -> Self {
            let (next, _) =
                ops::create_organization(&self.snapshot, name).expect("organization name");
            self.snapshot = next;
            self
        }

        pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
            self.snapshot = snapshot;
            self
        }

        pub fn attendance(mut self, policy: AttendancePolicy) -> Self {
            self.attendance = policy;
            self
        }

        pub fn sink(mut self, sink: Arc<dyn SyncSink>) -> Self {
            self.sink = Some(sink);
            self
        }

        pub async fn build(self) -> Result<Console, AppError> {
            init_test_tracing();

            let pool = connect("sqlite::memory:").await?;
            apply_schema(&pool).await?;

            let mut accounts = Vec::new();
            for (email, role, password) in self.accounts {
                accounts.push(Account {
                    email,
                    role,
                    password_hash: bcrypt::hash(password, 4)?,
                });
            }
            let authenticator: SharedAuthenticator =
                Arc::new(CredentialAuthenticator::new(accounts));

            let sink = self
                .sink
                .unwrap_or_else(|| Arc::new(SqliteSyncSink::new(pool.clone())));

            Ok(Console {
                pool,
                store: EntityStore::new(self.snapshot),
                sync: SyncQueue::start(sink, fast_sync()),
                attendance: self.attendance,
                authenticator,
            })
        }
    }

    /// An admin and a principal account over one organization.
    pub async fn create_standard_console() -> Console {
        TestConsoleBuilder::new()
            .admin(ADMIN_EMAIL)
            .principal(PRINCIPAL_EMAIL)
            .organization("Mahathma Gandhi Memorial College")
            .build()
            .await
            .expect("Failed to build test console")
    }

    pub async fn setup_test_client(console: Console) -> Client {
        Client::tracked(init_rocket(console))
            .await
            .expect("valid rocket instance")
    }

    pub async fn login_test_user(client: &Client, email: &str, password: &str) -> Status {
        client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await
            .status()
    }

    /// Polls a ticket until the worker has settled it.
    pub async fn wait_for_sync(queue: &SyncQueue, ticket: SyncTicket) -> SyncState {
        for _ in 0..200 {
            match queue.status(ticket) {
                Some(SyncState::Pending) | None => {
                    tokio::time::sleep(Duration::from_millis(10)).await
                }
                Some(state) => return state,
            }
        }
        panic!("sync ticket {:?} never settled", ticket);
    }
}
