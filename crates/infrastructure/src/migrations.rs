use sqlx::migrate::Migrator;

/// 仓库根目录 `migrations/` 下的建表脚本
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
