//! Embedded SQL migrations, applied by `database::Database::migrate`.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "migrations/"]
pub struct MigrationAssets;

impl MigrationAssets {
    /// Returns `(filename, contents)` pairs sorted by filename, so the
    /// numeric version prefix in each name determines application order.
    pub fn get_migrations() -> Vec<(String, String)> {
        let mut names: Vec<String> = Self::iter().map(|f| f.to_string()).collect();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| {
                Self::get(&name)
                    .map(|file| (name.clone(), String::from_utf8_lossy(&file.data).to_string()))
            })
            .collect()
    }
}
