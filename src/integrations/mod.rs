pub mod auth;
pub mod drive;

#[cfg(test)]
pub mod fake_drive;
