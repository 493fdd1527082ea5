//! Static description of the analytics schema that the language model is allowed to query.
//!
//! The tables here mirror `migrations/0001_create_tables.sql`. Nothing checks that the two agree at runtime: a
//! column renamed in the migration but not here shows up as recurring query errors.

/// A column of a [Table] together with the SQL type and a short human description for the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub description: &'static str,
    pub columns: &'static [Column],
    pub indexed: &'static [&'static str],
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexed.iter().any(|indexed| *indexed == column)
    }
}

/// A worked example mapping a question to the SQL that answers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Example {
    pub question: &'static str,
    pub sql: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    pub tables: &'static [Table],
    pub examples: &'static [Example],
}

impl Catalog {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables
            .iter()
            .find(|table| table.name.eq_ignore_ascii_case(name))
    }

    pub fn is_known_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tables.iter().map(|table| table.name)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        VIDEO_STATS
    }
}

macro_rules! columns {
    ($($name:literal : $sql_type:literal => $description:literal),* $(,)?) => {
        &[$(Column { name: $name, sql_type: $sql_type, description: $description }),*]
    };
}

pub const VIDEOS: Table = Table {
    name: "videos",
    description: "итоговая статистика по каждому видео",
    columns: columns! {
        "id": "UUID" => "уникальный идентификатор видео",
        "creator_id": "VARCHAR" => "ID креатора (строка)",
        "video_created_at": "TIMESTAMPTZ" => "дата и время публикации видео",
        "views_count": "INTEGER" => "финальное количество просмотров",
        "likes_count": "INTEGER" => "финальное количество лайков",
        "comments_count": "INTEGER" => "финальное количество комментариев",
        "reports_count": "INTEGER" => "финальное количество жалоб",
        "created_at": "TIMESTAMPTZ" => "время создания записи",
        "updated_at": "TIMESTAMPTZ" => "время обновления",
    },
    indexed: &["id", "creator_id", "video_created_at"],
};

pub const VIDEO_SNAPSHOTS: Table = Table {
    name: "video_snapshots",
    description: "почасовые снапшоты статистики",
    columns: columns! {
        "id": "VARCHAR" => "ID снапшота",
        "video_id": "UUID" => "ссылка на видео (FOREIGN KEY к videos.id)",
        "views_count": "INTEGER" => "просмотры на момент снапшота",
        "likes_count": "INTEGER" => "лайки на момент снапшота",
        "comments_count": "INTEGER" => "комментарии на момент снапшота",
        "reports_count": "INTEGER" => "жалобы на момент снапшота",
        "delta_views_count": "INTEGER" => "прирост просмотров за час",
        "delta_likes_count": "INTEGER" => "прирост лайков за час",
        "delta_comments_count": "INTEGER" => "прирост комментариев за час",
        "delta_reports_count": "INTEGER" => "прирост жалоб за час",
        "created_at": "TIMESTAMPTZ" => "время создания снапшота (раз в час)",
        "updated_at": "TIMESTAMPTZ" => "время обновления",
    },
    indexed: &["id", "video_id", "created_at"],
};

pub const EXAMPLES: &[Example] = &[
    Example {
        question: "Сколько всего видео есть в системе?",
        sql: "SELECT COUNT(*) FROM videos;",
    },
    Example {
        question: "Сколько видео у креатора с id aca1061a9d324ecf8c3fa2bb32d7be63 вышло с 1 ноября 2025 по 5 ноября 2025 включительно?",
        sql: "SELECT COUNT(*) FROM videos WHERE creator_id = 'aca1061a9d324ecf8c3fa2bb32d7be63' AND DATE(video_created_at) BETWEEN '2025-11-01' AND '2025-11-05';",
    },
    Example {
        question: "Сколько видео набрало больше 100000 просмотров за всё время?",
        sql: "SELECT COUNT(*) FROM videos WHERE views_count > 100000;",
    },
    Example {
        question: "На сколько просмотров в сумме выросли все видео 28 ноября 2025?",
        sql: "SELECT COALESCE(SUM(delta_views_count), 0) FROM video_snapshots WHERE DATE(created_at) = '2025-11-28';",
    },
    Example {
        question: "Сколько разных видео получали новые просмотры 27 ноября 2025?",
        sql: "SELECT COUNT(DISTINCT video_id) FROM video_snapshots WHERE DATE(created_at) = '2025-11-27' AND delta_views_count > 0;",
    },
    Example {
        question: "На сколько просмотров выросли все видео вчера?",
        sql: "SELECT COALESCE(SUM(delta_views_count), 0) FROM video_snapshots WHERE DATE(created_at) = CURRENT_DATE - 1;",
    },
];

/// The schema of the video statistics store.
pub const VIDEO_STATS: Catalog = Catalog {
    tables: &[VIDEOS, VIDEO_SNAPSHOTS],
    examples: EXAMPLES,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tables_are_case_insensitive() {
        let catalog = Catalog::default();
        assert!(catalog.is_known_table("videos"));
        assert!(catalog.is_known_table("VIDEO_SNAPSHOTS"));
        assert!(!catalog.is_known_table("users"));
    }

    #[test]
    fn documented_indexes_exist_as_columns() {
        for table in VIDEO_STATS.tables {
            for column in table.indexed {
                assert!(
                    table.column(column).is_some(),
                    "index on `{}.{}` refers to an unknown column",
                    table.name,
                    column
                );
            }
        }
    }

    #[test]
    fn examples_only_touch_known_tables() {
        for example in VIDEO_STATS.examples {
            assert!(
                VIDEO_STATS
                    .table_names()
                    .any(|table| example.sql.contains(table)),
                "example `{}` does not reference a catalog table",
                example.sql
            );
        }
    }

    #[test]
    fn example_count_is_reasonable() {
        assert!((3..=6).contains(&VIDEO_STATS.examples.len()));
    }
}
