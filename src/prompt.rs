use std::fmt::Write as _;

use crate::catalog::{Catalog, Example};

const ROLE: &str = "Ты — опытный SQL-аналитик. Твоя задача — преобразовывать вопросы на русском языке о статистике видео в корректные SQL-запросы к PostgreSQL.";

const RULES: &[&str] = &[
    "Твой ответ должен содержать ТОЛЬКО SQL-запрос, и ничего больше.",
    "НИКОГДА не пиши перед запросом слова \"SQL:\", \"Запрос:\", \"Ответ:\" или любые другие пояснения.",
    "НИКОГДА не используй форматирование с обратными кавычками (```sql ... ```).",
    "Запрос должен возвращать ОДНО ЧИСЛО: одну строку и один столбец (используй COUNT(), SUM(), COUNT(DISTINCT ...)).",
    "Используй только SELECT. Запросы, изменяющие данные, запрещены.",
    "Даты в SQL указывай в формате 'YYYY-MM-DD'.",
    "Для извлечения даты из TIMESTAMPTZ используй функцию DATE().",
    "Относительные даты не вычисляй сам: «сегодня» — CURRENT_DATE, «вчера» — CURRENT_DATE - 1, «за последние N дней» — DATE(...) > CURRENT_DATE - N.",
    "Если год в дате не указан, используй CURRENT_DATE для определения года: EXTRACT(YEAR FROM CURRENT_DATE).",
    "ID креатора — это строка, обязательно оборачивай в одинарные кавычки.",
    "Для сумм используй COALESCE(SUM(...), 0), чтобы пустой результат был нулём.",
];

/// Build the instruction text sent to the language model.
///
/// The output depends only on the arguments: the same catalog, examples and question always produce the same
/// text.
pub fn build(schema: &Catalog, examples: &[Example], question: &str) -> String {
    let mut prompt = String::new();

    // writing into a String never fails
    let _ = write_prompt(&mut prompt, schema, examples, question);

    prompt
}

fn write_prompt(
    out: &mut String, schema: &Catalog, examples: &[Example], question: &str,
) -> std::fmt::Result {
    writeln!(out, "{ROLE}")?;
    writeln!(out)?;

    writeln!(out, "ВАЖНЕЙШИЕ ПРАВИЛА:")?;
    for (n, rule) in RULES.iter().enumerate() {
        writeln!(out, "{}. {}", n + 1, rule)?;
    }
    writeln!(out)?;

    writeln!(out, "СТРУКТУРА БАЗЫ ДАННЫХ:")?;
    for (n, table) in schema.tables.iter().enumerate() {
        writeln!(out)?;
        writeln!(
            out,
            "{}. ТАБЛИЦА {} ({}):",
            n + 1,
            table.name,
            table.description
        )?;
        for column in table.columns {
            let index = if table.is_indexed(column.name) { ", индекс" } else { "" };
            writeln!(
                out,
                "   - {} ({}{}) — {}",
                column.name, column.sql_type, index, column.description
            )?;
        }
    }
    writeln!(out)?;

    writeln!(out, "ПРИМЕРЫ ПРЕОБРАЗОВАНИЯ:")?;
    for example in examples {
        writeln!(out)?;
        writeln!(out, "Вопрос: \"{}\"", example.question)?;
        writeln!(out, "SQL: {}", example.sql)?;
    }
    writeln!(out)?;

    writeln!(out, "Вопрос: \"{}\"", question.trim())?;
    write!(out, "SQL:")
}
