use std::sync::Arc;

use crate::{
    announcements::AnnouncementRepo,
    attendance::AttendanceLedger,
    auth::{CredentialStore, JwtKeys},
    classes::ClassRepo,
    config::AppConfig,
    db::Db,
    enrollments::EnrollmentLedger,
    payments::PaymentLedger,
    users::UserRepo,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub users: UserRepo,
    pub classes: ClassRepo,
    pub enrollments: EnrollmentLedger,
    pub attendance: AttendanceLedger,
    pub payments: PaymentLedger,
    pub announcements: AnnouncementRepo,
}

impl AppState {
    /// Reads config from the environment, opens the database and runs migrations.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = Db::connect(&config.database_url, config.database_max_connections).await?;
        db.migrate().await?;
        Self::from_parts(db, config)
    }

    pub fn from_parts(db: Db, config: Arc<AppConfig>) -> anyhow::Result<Self> {
        let credentials = CredentialStore::new(&config.password)?;
        let keys = JwtKeys::new(&config.jwt);
        Ok(Self {
            users: UserRepo::new(&db, credentials),
            classes: ClassRepo::new(&db),
            enrollments: EnrollmentLedger::new(&db),
            attendance: AttendanceLedger::new(&db),
            payments: PaymentLedger::new(&db),
            announcements: AnnouncementRepo::new(&db),
            keys,
            config,
            db,
        })
    }
}
