//! sprig-demo: in-memory user service on top of sprig-core
//!
//! Endpoints:
//! - `GET /get-all-users`
//! - `GET /get-user/:userId`
//! - `POST /add-student`

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sprig_core::{RequestContext, ResponseWriter, Result, Server, StatusCode};
use std::sync::Arc;

/// A stored user record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub age: i64,
}

impl User {
    pub fn new(id: i64, name: &str, phone: &str, age: i64) -> Self {
        Self {
            id,
            name: name.to_string(),
            phone: phone.to_string(),
            age,
        }
    }

    /// First problem that keeps this record from being stored
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.name.is_empty() {
            return Err("Name is required");
        }
        if self.phone.is_empty() {
            return Err("Phone is required");
        }
        if self.age <= 0 {
            return Err("Invalid age");
        }
        Ok(())
    }
}

/// Append-only user store shared by all handlers
#[derive(Debug)]
pub struct UserRepository {
    users: RwLock<Vec<User>>,
}

impl UserRepository {
    /// Empty repository
    pub fn new() -> Self {
        Self {
            users: RwLock::new(Vec::new()),
        }
    }

    /// Repository preloaded with the demo records
    pub fn seeded() -> Self {
        Self {
            users: RwLock::new(vec![
                User::new(1, "Pavan Illa", "9381122977", 24),
                User::new(2, "John Doe", "9381122988", 28),
                User::new(3, "Peter Griffin", "8978987899", 44),
            ]),
        }
    }

    /// Snapshot of every record in insertion order
    pub fn get_all(&self) -> Vec<User> {
        self.users.read().clone()
    }

    pub fn get_by_id(&self, id: i64) -> Option<User> {
        self.users.read().iter().find(|user| user.id == id).cloned()
    }

    /// Store `user` under the next id and return the stored record.
    ///
    /// Ids come from the current length, which is only unique while
    /// records are never removed.
    pub fn add(&self, mut user: User) -> User {
        let mut users = self.users.write();
        user.id = users.len() as i64 + 1;
        users.push(user.clone());
        user
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl Default for UserRepository {
    fn default() -> Self {
        Self::seeded()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

#[derive(Serialize)]
struct StudentAdded<'a> {
    message: &'a str,
    user: &'a User,
}

async fn error(res: &mut ResponseWriter, status: StatusCode, message: &str) -> Result<()> {
    res.status(status).json(&ErrorBody { error: message }).await
}

async fn get_all_users(users: Arc<UserRepository>, res: &mut ResponseWriter) -> Result<()> {
    res.status(StatusCode::OK).json(&users.get_all()).await
}

async fn get_user(
    users: Arc<UserRepository>,
    req: RequestContext,
    res: &mut ResponseWriter,
) -> Result<()> {
    let Some(id) = req
        .path_param("userId")
        .and_then(|raw| raw.parse::<i64>().ok())
    else {
        return error(res, StatusCode::BAD_REQUEST, "Invalid UserId").await;
    };

    match users.get_by_id(id) {
        Some(user) => res.status(StatusCode::OK).json(&user).await,
        None => error(res, StatusCode::NOT_FOUND, "User not found").await,
    }
}

async fn add_student(
    users: Arc<UserRepository>,
    mut req: RequestContext,
    res: &mut ResponseWriter,
) -> Result<()> {
    // A literal `null` decodes to an empty user and fails validation
    let Some(user) = req.body::<Option<User>>().await else {
        return error(res, StatusCode::BAD_REQUEST, "Invalid request body").await;
    };
    let user = user.unwrap_or_default();

    if let Err(message) = user.validate() {
        return error(res, StatusCode::BAD_REQUEST, message).await;
    }

    let user = users.add(user);
    tracing::info!(id = user.id, "student added");
    res.status(StatusCode::CREATED)
        .json(&StudentAdded {
            message: "Student added successfully",
            user: &user,
        })
        .await
}

/// Register the demo endpoints on `server`
pub fn mount(server: &Server, users: Arc<UserRepository>) {
    let repo = users.clone();
    server.get("/get-all-users", move |_req, res| {
        Box::pin(get_all_users(repo.clone(), res))
    });

    let repo = users.clone();
    server.get("/get-user/:userId", move |req, res| {
        Box::pin(get_user(repo.clone(), req, res))
    });

    server.post("/add-student", move |req, res| {
        Box::pin(add_student(users.clone(), req, res))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_repository() {
        let repo = UserRepository::seeded();
        let all = repo.get_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], User::new(1, "Pavan Illa", "9381122977", 24));
        assert_eq!(all[2].name, "Peter Griffin");

        assert_eq!(repo.get_by_id(2).map(|u| u.name), Some("John Doe".to_string()));
        assert!(repo.get_by_id(99).is_none());
        assert!(repo.get_by_id(0).is_none());
    }

    #[test]
    fn test_add_assigns_next_id() {
        let repo = UserRepository::seeded();
        let added = repo.add(User::new(42, "Teja", "9000000000", 30));
        assert_eq!(added.id, 4);
        assert_eq!(repo.get_by_id(4), Some(added));
        assert_eq!(repo.len(), 4);

        let empty = UserRepository::new();
        assert!(empty.is_empty());
        assert_eq!(empty.add(User::new(0, "A", "1", 1)).id, 1);
    }

    #[test]
    fn test_validation_order() {
        assert_eq!(User::new(0, "", "", 0).validate(), Err("Name is required"));
        assert_eq!(User::new(0, "A", "", 0).validate(), Err("Phone is required"));
        assert_eq!(User::new(0, "A", "1", 0).validate(), Err("Invalid age"));
        assert_eq!(User::new(0, "A", "1", -5).validate(), Err("Invalid age"));
        assert_eq!(User::new(0, "A", "1", 1).validate(), Ok(()));
    }

    #[test]
    fn test_partial_body_defaults() {
        let user: User = serde_json::from_str(r#"{"name":"Teja"}"#).unwrap();
        assert_eq!(user, User::new(0, "Teja", "", 0));
        assert!(serde_json::from_str::<User>(r#"{"age":"old"}"#).is_err());
    }

    #[test]
    fn test_wire_shapes() {
        let user = User::new(4, "Teja", "9000000000", 30);
        let added = StudentAdded {
            message: "Student added successfully",
            user: &user,
        };
        assert_eq!(
            serde_json::to_string(&added).unwrap(),
            r#"{"message":"Student added successfully","user":{"id":4,"name":"Teja","phone":"9000000000","age":30}}"#
        );
        assert_eq!(
            serde_json::to_string(&ErrorBody { error: "User not found" }).unwrap(),
            r#"{"error":"User not found"}"#
        );
    }

    #[test]
    fn test_mount_registers_routes() {
        let server = Server::default();
        mount(&server, Arc::new(UserRepository::seeded()));

        assert_eq!(server.routes().len(), 3);
        assert!(server.routes().lookup("GET", "/get-all-users").is_some());
        assert_eq!(
            server.routes().lookup("GET", "/get-user/7").unwrap().params["userId"],
            "7"
        );
        assert!(server.routes().lookup("POST", "/add-student").is_some());
        assert!(server.routes().lookup("GET", "/add-student").is_none());
    }
}
