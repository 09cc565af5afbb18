use meridian_db::Database;
use meridian_db::models::NewUser;
use meridian_types::models::{CompanyStatus, Role, Visibility};
use uuid::Uuid;

use crate::Principal;

pub fn db() -> Database {
    Database::open_in_memory().unwrap()
}

pub fn user(db: &Database, role: Role) -> Principal {
    let id = Uuid::new_v4();
    let email = format!("{id}@example.com");
    db.create_user(&NewUser {
        id,
        email: &email,
        username: "tester",
        password_hash: "hash",
        role,
    })
    .unwrap();
    Principal::new(id, role)
}

pub fn company(db: &Database, owner: Uuid, status: CompanyStatus, visibility: Visibility) -> Uuid {
    let id = Uuid::new_v4();
    db.create_company(id, owner, None, "Acme Robotics").unwrap();
    db.review_company(id, status, Some(visibility)).unwrap();
    id
}
