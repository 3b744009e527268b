use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::{AccountTx, RepoError, TodoRepository, TxManager, UserRepository};
use crate::ids::{TodoId, UserId};
use crate::model::{NewTodo, OAuthProfile, Todo, TodoPatch, User};

#[derive(Debug, Clone, Default)]
struct Tables {
    todos: BTreeMap<TodoId, Todo>,
    users: BTreeMap<UserId, User>,
    last_todo_id: i64,
    last_user_id: i64,
}

impl Tables {
    fn live_todo(&self, id: TodoId, user_id: UserId) -> Option<&Todo> {
        self.todos
            .get(&id)
            .filter(|t| t.user_id == user_id && t.deleted_at.is_none())
    }

    fn live_todo_mut(&mut self, id: TodoId, user_id: UserId) -> Option<&mut Todo> {
        self.todos
            .get_mut(&id)
            .filter(|t| t.user_id == user_id && t.deleted_at.is_none())
    }

    fn live_user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id).filter(|u| u.deleted_at.is_none())
    }

    /// Unique constraints hold among live users only, like a partial unique index.
    fn check_user_unique(&self, profile: &OAuthProfile, except: Option<UserId>) -> Result<(), RepoError> {
        for user in self.users.values() {
            if user.deleted_at.is_some() || Some(user.id) == except {
                continue;
            }
            if user.email == profile.email {
                return Err(RepoError::Constraint("users.email must be unique".into()));
            }
            if user.provider == profile.provider && user.provider_id == profile.provider_id {
                return Err(RepoError::Constraint(
                    "users(provider, provider_id) must be unique".into(),
                ));
            }
        }
        Ok(())
    }

    fn soft_delete_todos_of(&mut self, user_id: UserId, now: DateTime<Utc>) -> u64 {
        let mut count = 0;
        for todo in self.todos.values_mut() {
            if todo.user_id == user_id && todo.deleted_at.is_none() {
                todo.deleted_at = Some(now);
                count += 1;
            }
        }
        count
    }
}

/// In-process store for both repositories and the transaction manager.
///
/// Reads take the shared lock and writes the exclusive one; no I/O happens
/// under either. A transaction holds the exclusive lock for its whole callback
/// and works on a copy of the tables that replaces the live ones only on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TodoRepository for MemoryStore {
    fn list(&self, user_id: UserId) -> Result<Vec<Todo>, RepoError> {
        let tables = self.tables.read();
        let mut todos: Vec<Todo> = tables
            .todos
            .values()
            .filter(|t| t.user_id == user_id && t.deleted_at.is_none())
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(todos)
    }

    fn get(&self, id: TodoId, user_id: UserId) -> Result<Todo, RepoError> {
        self.tables
            .read()
            .live_todo(id, user_id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    fn create(&self, new: NewTodo) -> Result<Todo, RepoError> {
        let mut tables = self.tables.write();
        if tables.live_user(new.user_id).is_none() {
            return Err(RepoError::Constraint(format!(
                "todos.user_id references missing user {}",
                new.user_id
            )));
        }
        tables.last_todo_id += 1;
        let now = Utc::now();
        let todo = Todo {
            id: TodoId(tables.last_todo_id),
            title: new.title,
            description: new.description,
            completed: false,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    fn update(&self, id: TodoId, user_id: UserId, patch: &TodoPatch) -> Result<Todo, RepoError> {
        let mut tables = self.tables.write();
        let todo = tables.live_todo_mut(id, user_id).ok_or(RepoError::NotFound)?;
        patch.apply(todo, Utc::now());
        Ok(todo.clone())
    }

    fn delete(&self, id: TodoId, user_id: UserId) -> Result<(), RepoError> {
        let mut tables = self.tables.write();
        let todo = tables.live_todo_mut(id, user_id).ok_or(RepoError::NotFound)?;
        todo.deleted_at = Some(Utc::now());
        Ok(())
    }

    fn complete_many(&self, ids: &[TodoId], user_id: UserId) -> Result<Vec<Todo>, RepoError> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        let mut seen = HashSet::with_capacity(ids.len());
        let mut done = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(*id) {
                continue;
            }
            if let Some(todo) = tables.live_todo_mut(*id, user_id) {
                todo.completed = true;
                todo.updated_at = now;
                done.push(todo.clone());
            }
        }
        Ok(done)
    }

    fn delete_many(&self, ids: &[TodoId], user_id: UserId) -> Result<Vec<TodoId>, RepoError> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(todo) = tables.live_todo_mut(*id, user_id) {
                todo.deleted_at = Some(now);
                todo.updated_at = now;
                deleted.push(*id);
            }
        }
        Ok(deleted)
    }
}

impl UserRepository for MemoryStore {
    fn get(&self, id: UserId) -> Result<User, RepoError> {
        self.tables
            .read()
            .live_user(id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    fn find_by_provider(&self, provider: &str, provider_id: &str) -> Result<User, RepoError> {
        self.tables
            .read()
            .users
            .values()
            .find(|u| u.deleted_at.is_none() && u.provider == provider && u.provider_id == provider_id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    fn create(&self, profile: &OAuthProfile) -> Result<User, RepoError> {
        let mut tables = self.tables.write();
        tables.check_user_unique(profile, None)?;
        tables.last_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: UserId(tables.last_user_id),
            email: profile.email.clone(),
            name: profile.name.clone(),
            avatar_url: profile.avatar_url.clone(),
            provider: profile.provider.clone(),
            provider_id: profile.provider_id.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn update_profile(&self, id: UserId, profile: &OAuthProfile) -> Result<User, RepoError> {
        let mut tables = self.tables.write();
        tables.check_user_unique(profile, Some(id))?;
        let user = tables
            .users
            .get_mut(&id)
            .filter(|u| u.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        user.email.clone_from(&profile.email);
        user.name.clone_from(&profile.name);
        user.avatar_url.clone_from(&profile.avatar_url);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
    now: DateTime<Utc>,
}

impl AccountTx for MemoryTx<'_> {
    fn delete_todos_of(&mut self, user_id: UserId) -> Result<u64, RepoError> {
        Ok(self.tables.soft_delete_todos_of(user_id, self.now))
    }

    fn delete_user(&mut self, user_id: UserId) -> Result<(), RepoError> {
        let user = self
            .tables
            .users
            .get_mut(&user_id)
            .filter(|u| u.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        user.deleted_at = Some(self.now);
        Ok(())
    }
}

impl TxManager for MemoryStore {
    fn run_in_tx(
        &self,
        f: &mut dyn FnMut(&mut dyn AccountTx) -> Result<(), RepoError>,
    ) -> Result<(), RepoError> {
        let mut live = self.tables.write();
        let mut working = live.clone();
        let result = f(&mut MemoryTx {
            tables: &mut working,
            now: Utc::now(),
        });
        match result {
            Ok(()) => {
                *live = working;
                debug!("Transaction committed");
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "Transaction rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(sub: &str, email: &str) -> OAuthProfile {
        OAuthProfile {
            provider: "google".into(),
            provider_id: sub.into(),
            email: email.into(),
            name: "Ada".into(),
            avatar_url: None,
        }
    }

    fn seeded() -> (MemoryStore, UserId) {
        let store = MemoryStore::new();
        let user = UserRepository::create(&store, &profile("sub-1", "ada@example.com")).unwrap();
        (store, user.id)
    }

    fn new_todo(user_id: UserId, title: &str) -> NewTodo {
        NewTodo {
            user_id,
            title: title.into(),
            description: None,
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let (store, uid) = seeded();
        let a = TodoRepository::create(&store, new_todo(uid, "a")).unwrap();
        let b = TodoRepository::create(&store, new_todo(uid, "b")).unwrap();
        assert_eq!(a.id, TodoId(1));
        assert_eq!(b.id, TodoId(2));
    }

    #[test]
    fn test_list_newest_first() {
        let (store, uid) = seeded();
        for title in ["first", "second", "third"] {
            TodoRepository::create(&store, new_todo(uid, title)).unwrap();
        }
        let titles: Vec<String> = store.list(uid).unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_todo_requires_live_owner() {
        let store = MemoryStore::new();
        let err = TodoRepository::create(&store, new_todo(UserId(99), "orphan")).unwrap_err();
        assert!(matches!(err, RepoError::Constraint(_)));
    }

    #[test]
    fn test_soft_deleted_rows_invisible() {
        let (store, uid) = seeded();
        let todo = TodoRepository::create(&store, new_todo(uid, "gone")).unwrap();
        TodoRepository::delete(&store, todo.id, uid).unwrap();
        assert!(matches!(TodoRepository::get(&store, todo.id, uid), Err(RepoError::NotFound)));
        assert!(matches!(TodoRepository::delete(&store, todo.id, uid), Err(RepoError::NotFound)));
        assert!(store.list(uid).unwrap().is_empty());
    }

    #[test]
    fn test_user_uniqueness_among_live_rows() {
        let (store, _) = seeded();
        let dup = UserRepository::create(&store, &profile("sub-2", "ada@example.com"));
        assert!(matches!(dup, Err(RepoError::Constraint(_))));
    }

    #[test]
    fn test_tx_commit_and_rollback() {
        let (store, uid) = seeded();
        TodoRepository::create(&store, new_todo(uid, "keep me")).unwrap();

        let err = store
            .run_in_tx(&mut |tx| {
                tx.delete_todos_of(uid)?;
                Err(RepoError::Backend("injected".into()))
            })
            .unwrap_err();
        assert!(matches!(err, RepoError::Backend(_)));
        assert_eq!(store.list(uid).unwrap().len(), 1);

        store
            .run_in_tx(&mut |tx| {
                tx.delete_todos_of(uid)?;
                tx.delete_user(uid)
            })
            .unwrap();
        assert!(store.list(uid).unwrap().is_empty());
        assert!(matches!(UserRepository::get(&store, uid), Err(RepoError::NotFound)));
    }
}
