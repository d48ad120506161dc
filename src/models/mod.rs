pub mod local;
pub mod message;
pub mod post;
pub mod profile;
pub mod question;
pub mod session;

pub use local::LocalStores;
pub use message::{ChatMessage, Role};
pub use post::{NewPost, PgPostStore, Post, PostStore};
pub use profile::{PgProfileStore, ProfileDefaults, ProfileStore, UserProfile, TERMS_VERSION};
pub use question::{NewQuestion, PgQuestionStore, PublicQuestion, QuestionStatus, QuestionStore};
pub use session::{AccountSessions, ChatSession, CloudSessions, PgSessionStore, SessionStore};
