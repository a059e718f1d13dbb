pub const ROLE_LISTENER: &str = "Listener";
pub const ROLE_ADMIN: &str = "Admin";

