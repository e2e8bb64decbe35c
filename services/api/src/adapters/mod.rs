pub mod db;
pub mod meeting;

pub use db::DbAdapter;
pub use meeting::LinkRoomProvider;
