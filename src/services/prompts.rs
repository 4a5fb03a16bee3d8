// src/services/prompts.rs
//! Message builders for each model call the pipeline makes.

use crate::models::{Language, ModelMessage, PriceStrategy};
use crate::services::category_resolver::TOP_LEVEL_GROUPS;

/// Context carried from the vision stage into the category and price calls.
#[derive(Debug, Clone, Default)]
pub struct ProductContext<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub brand: &'a str,
    pub group_name: &'a str,
}

fn group_list() -> String {
    TOP_LEVEL_GROUPS
        .iter()
        .enumerate()
        .map(|(i, g)| format!("    {}. {}", i + 1, g))
        .collect::<Vec<_>>()
        .join("\n")
}

fn vision_price_section(strategy: PriceStrategy) -> (&'static str, &'static str) {
    match strategy {
        PriceStrategy::None | PriceStrategy::Dedicated => ("", ""),
        PriceStrategy::Inline => (
            "- Propose up to three realistic second-hand prices in Japanese Yen (integers), \
             most likely price first, in \"prices\".\n",
            "  \"prices\": [number, number, number],\n",
        ),
        PriceStrategy::Search => (
            "- Use web search to find recent comparable listings on Mercari Japan and other \
             Japanese resale sites, then propose grounded prices in Japanese Yen (integers): \
             \"low\" (quick sale), \"mid\" (typical), \"high\" (top-end), plus \"range.min\" and \
             \"range.max\" covering the observed comparables.\n",
            "  \"prices\": {\"low\": number, \"mid\": number, \"high\": number, \
             \"range\": {\"min\": number, \"max\": number}},\n",
        ),
    }
}

pub fn vision_messages(
    strategy: PriceStrategy,
    language: Language,
    image_data_url: &str,
) -> Vec<ModelMessage> {
    let (price_task, price_schema) = vision_price_section(strategy);
    let system = format!(
        "You are an assistant helping sellers list items on Mercari Japan.\n\n\
         Given ONE product image:\n\
         - Infer what the product is, its condition and any visible details.\n\
         - Write a short, clear, buyer-friendly listing title.\n\
         - Write a concise description covering condition, accessories and notes.\n\
         {price_task}\
         - Choose the single best top-level category, exactly one of:\n{groups}\n\
         - If a brand name is clearly printed on the item or its packaging, return it exactly \
         as printed; otherwise return an empty string. Do not guess.\n\n\
         Respond with pure JSON only, no markdown, no comments:\n\
         {{\n  \"title\": \"string\",\n  \"description\": \"string\",\n{price_schema}  \
         \"top_level_category\": \"string\",\n  \"brand_name\": \"string\"\n}}",
        groups = group_list(),
    );
    let user = format!(
        "Look at this product image and fill in all JSON fields.\n\
         Language for title and description: {}.\n\
         If you are not sure about the brand, set \"brand_name\" to \"\".",
        language.label()
    );
    vec![
        ModelMessage::system(system),
        ModelMessage::user_with_image(user, image_data_url),
    ]
}

pub fn category_messages(context: &ProductContext<'_>, candidate_paths: &[&str]) -> Vec<ModelMessage> {
    let system = "You are an e-commerce taxonomy specialist for the Japanese marketplace Mercari.\n\n\
        You are given ONE product and a list of candidate category paths under its top-level \
        category. Choose the single best path and up to 2 alternatives, only from the candidate \
        list. Never invent or modify a path. Fewer alternatives are fine.\n\n\
        Respond with pure JSON only:\n\
        {\n  \"best_target_path\": \"string\",\n  \"confidence\": 0.0,\n  \"reason\": \"string\",\n  \
        \"alternatives\": [{\"target_path\": \"string\", \"confidence\": 0.0, \"reason\": \"string\"}]\n}";
    let user = format!(
        "Product information:\n\
         - Title: {}\n\
         - Description: {}\n\
         - Brand (may be empty): {}\n\
         - Top-level category: {}\n\n\
         Candidate category paths, one per line:\n\n{}\n\n\
         Only use category paths from the candidate list.",
        context.title,
        context.description,
        context.brand,
        context.group_name,
        candidate_paths.join("\n"),
    );
    vec![ModelMessage::system(system), ModelMessage::user(user)]
}

pub fn group_messages(title: &str) -> Vec<ModelMessage> {
    let system = format!(
        "You classify marketplace listings. Given a listing title, choose the single best \
         top-level category, exactly one of:\n{}\n\n\
         Respond with pure JSON only: {{\"top_level_category\": \"string\"}}",
        group_list()
    );
    vec![
        ModelMessage::system(system),
        ModelMessage::user(format!("Listing title: {}", title)),
    ]
}

pub fn price_messages(
    context: &ProductContext<'_>,
    candidate_categories: &[&str],
    language: Language,
    image_data_url: Option<&str>,
) -> Vec<ModelMessage> {
    let system = "You are a pricing assistant for second-hand items on Mercari Japan.\n\n\
        Treat the item as USED. Use web search to find recent comparable USED listings on \
        Mercari Japan (highest priority), Yahoo Auctions or Rakuma; ignore retail prices. \
        Output integer JPY prices: low (fast sale), mid (typical), high (top-end), plus a \
        min/max range covering the comparables. If comparables are scarce, widen the range.\n\n\
        Output JSON only:\n\
        {\n  \"prices\": {\"low\": number, \"mid\": number, \"high\": number, \
        \"range\": {\"min\": number, \"max\": number}},\n  \"reason\": \"short note\"\n}";
    let categories = if candidate_categories.is_empty() {
        "(none)".to_string()
    } else {
        candidate_categories.join(" / ")
    };
    let user = format!(
        "Product context:\n\
         - Title: {}\n\
         - Description: {}\n\
         - Brand: {}\n\
         - Top-level category: {}\n\
         - Candidate categories: {}\n\
         - Language for notes: {}\n\n\
         Return JSON only following the schema.",
        context.title,
        context.description,
        context.brand,
        context.group_name,
        categories,
        language.label(),
    );
    let user = match image_data_url {
        Some(url) => ModelMessage::user_with_image(user, url),
        None => ModelMessage::user(user),
    };
    vec![ModelMessage::system(system), user]
}
