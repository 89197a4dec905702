/// Key holding the currently authenticated user.
pub const CURRENT_USER_KEY: &str = "current_user";

/// Collection names, shared by the local array store and the relational
/// table names.
pub const USERS_COLLECTION: &str = "users";
pub const ITEMS_COLLECTION: &str = "items";
pub const LIKES_COLLECTION: &str = "likes";
pub const DISLIKES_COLLECTION: &str = "dislikes";
pub const MATCHES_COLLECTION: &str = "matches";
pub const MESSAGES_COLLECTION: &str = "messages";

/// Name given to anonymous users who did not pick one.
pub const DEFAULT_ANONYMOUS_NAME: &str = "Anonymous";

/// Field limits
pub const MAX_NAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_ITEM_TITLE_LENGTH: usize = 80;
pub const MAX_ITEM_DESCRIPTION_LENGTH: usize = 1_000;
pub const MAX_PHOTO_URL_LENGTH: usize = 2_048;
pub const MAX_MESSAGE_LENGTH: usize = 2_000;

/// Password hashing (BLAKE3 KDF)
pub const KDF_CONTEXT_PASSWORD: &str = "rebox-password-hash-v1";
pub const PASSWORD_SALT_SIZE: usize = 16;

/// Default capacity of the real-time broadcast channel.
pub const DEFAULT_REALTIME_CAPACITY: usize = 256;
