use sqlx::{FromRow, PgPool};

use crate::domain::{
    code::CodeType,
    taxonomy::{KeywordFamily, Taxonomy},
};

#[derive(FromRow)]
struct IndustryRow {
    name: String,
}

#[derive(FromRow)]
struct IndustryKeywordRow {
    industry: String,
    keyword: String,
    weight: f64,
}

#[derive(FromRow)]
struct IndustryCodeRow {
    industry: String,
    code_type: String,
    code: String,
    description: String,
    weight: f64,
}

#[derive(FromRow)]
struct KeywordCodeRow {
    keyword: String,
    code_type: String,
    code: String,
    description: String,
    relevance: f64,
}

#[derive(FromRow)]
struct CrosswalkRow {
    mcc: String,
    naics: String,
    sic: String,
}

#[derive(FromRow)]
struct KeywordFamilyRow {
    name: String,
    keywords: Vec<String>,
    compatible_industries: Vec<String>,
}

/// Reads every taxonomy table into one snapshot. Rows with an unknown code
/// type are skipped.
pub async fn load_taxonomy(pool: &PgPool) -> Result<Taxonomy, sqlx::Error> {
    let industries = sqlx::query_as::<_, IndustryRow>(
        r#"
        select
            name
        from
            industry
        "#,
    )
    .fetch_all(pool)
    .await?;

    let keywords = sqlx::query_as::<_, IndustryKeywordRow>(
        r#"
        select
            industry,
            keyword,
            weight
        from
            industry_keyword
        "#,
    )
    .fetch_all(pool)
    .await?;

    let industry_codes = sqlx::query_as::<_, IndustryCodeRow>(
        r#"
        select
            industry,
            code_type,
            code,
            description,
            weight
        from
            industry_code
        "#,
    )
    .fetch_all(pool)
    .await?;

    let keyword_codes = sqlx::query_as::<_, KeywordCodeRow>(
        r#"
        select
            keyword,
            code_type,
            code,
            description,
            relevance
        from
            keyword_code
        "#,
    )
    .fetch_all(pool)
    .await?;

    let crosswalk = sqlx::query_as::<_, CrosswalkRow>(
        r#"
        select
            mcc,
            naics,
            sic
        from
            code_crosswalk
        "#,
    )
    .fetch_all(pool)
    .await?;

    let families = sqlx::query_as::<_, KeywordFamilyRow>(
        r#"
        select
            name,
            keywords,
            compatible_industries
        from
            keyword_family
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut builder = Taxonomy::builder();
    for row in industries {
        builder = builder.industry(&row.name);
    }
    for row in keywords {
        builder = builder.keyword(&row.keyword, &row.industry, row.weight);
    }
    for row in industry_codes {
        match row.code_type.parse::<CodeType>() {
            Ok(code_type) => {
                builder = builder.industry_code(
                    &row.industry,
                    code_type,
                    &row.code,
                    &row.description,
                    row.weight,
                )
            }
            Err(e) => log::warn!("Skipping code {} for {}. Error: {}", row.code, row.industry, e),
        }
    }
    for row in keyword_codes {
        match row.code_type.parse::<CodeType>() {
            Ok(code_type) => {
                builder = builder.keyword_code(
                    &row.keyword,
                    code_type,
                    &row.code,
                    &row.description,
                    row.relevance,
                )
            }
            Err(e) => log::warn!("Skipping code {} for {}. Error: {}", row.code, row.keyword, e),
        }
    }
    for row in crosswalk {
        builder = builder.crosswalk(&row.mcc, &row.naics, &row.sic);
    }
    for row in families {
        builder = builder.family(KeywordFamily {
            name: row.name,
            keywords: row.keywords,
            compatible_industries: row.compatible_industries.into_iter().collect(),
        });
    }

    Ok(builder.build())
}
