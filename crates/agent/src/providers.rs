//! Collaborator contracts the default actions and scenes read from, plus the
//! in-process implementations used by the simulator and tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use scenebot_core::domain::user::{Segment, User};

const PREVIEW_LIMIT: usize = 120;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Material {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            url: None,
            tags: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|tag| tag.to_string()).collect();
        self
    }

    pub fn for_segments(mut self, segments: &[Segment]) -> Self {
        self.segments = segments.to_vec();
        self
    }

    /// Single-line summary, cut to 120 characters.
    pub fn preview(&self) -> Option<String> {
        let flattened = self.summary.trim().replace('\n', " ");
        if flattened.is_empty() {
            return None;
        }
        if flattened.chars().count() <= PREVIEW_LIMIT {
            return Some(flattened);
        }
        let cut: String = flattened.chars().take(PREVIEW_LIMIT - 3).collect();
        Some(format!("{cut}..."))
    }

    fn serves(&self, segment: Option<Segment>) -> bool {
        match segment {
            Some(segment) => self.segments.is_empty() || self.segments.contains(&segment),
            None => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub code: String,
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[async_trait]
pub trait MaterialsProvider: Send + Sync {
    /// Materials matching the conversation context, topped up from the
    /// segment and then from the newest entries.
    async fn materials_by_context(
        &self,
        context: &str,
        segment: &str,
        limit: usize,
    ) -> Result<Vec<Material>>;

    async fn materials_for_segment(&self, segment: &str, limit: usize) -> Result<Vec<Material>>;

    fn format_for_delivery(&self, materials: &[Material]) -> String {
        format_materials(materials)
    }
}

#[async_trait]
pub trait BonusProvider: Send + Sync {
    async fn welcome_bonus_text(&self) -> Result<String>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn suitable_products(&self, user: &User) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait PromptLoader: Send + Sync {
    async fn load_prompt(&self, stem: &str) -> Option<String>;
}

pub fn format_materials(materials: &[Material]) -> String {
    if materials.is_empty() {
        return "📚 Unfortunately no matching materials are available right now. Please contact a manager for help."
            .to_string();
    }

    let mut lines = vec!["📚 **Useful materials for you:**".to_string(), String::new()];
    for (index, material) in materials.iter().enumerate() {
        lines.push(format!("{}. **{}**", index + 1, material.title));
        if let Some(preview) = material.preview() {
            lines.push(format!("   _{preview}_"));
        }
        if let Some(url) = &material.url {
            lines.push(format!("   🔗 [Open material]({url})"));
        }
        lines.push(String::new());
    }
    lines.push("💡 *These materials were picked for your level and goals!*".to_string());
    lines.join("\n")
}

const CONTEXT_TAGS: &[(&str, &[&str])] = &[
    ("basics", &["basics", "beginners"]),
    ("beginner", &["beginners", "basics"]),
    ("safety", &["safety", "risk"]),
    ("trading", &["trading", "deals"]),
    ("analysis", &["analysis", "charts"]),
    ("strategy", &["strategy"]),
    ("invest", &["investing", "portfolio"]),
    ("defi", &["defi"]),
    ("nft", &["nft"]),
    ("bitcoin", &["bitcoin", "btc"]),
    ("ethereum", &["ethereum", "eth"]),
    ("altcoin", &["altcoins"]),
];

fn context_tags(context: &str) -> Vec<&'static str> {
    let lowered = context.to_lowercase();
    let mut tags = Vec::new();
    for (phrase, mapped) in CONTEXT_TAGS {
        if lowered.contains(phrase) {
            for tag in *mapped {
                if !tags.contains(tag) {
                    tags.push(*tag);
                }
            }
        }
    }
    tags
}

/// Catalog kept in memory, newest material last.
#[derive(Clone, Debug, Default)]
pub struct StaticMaterials {
    materials: Vec<Material>,
}

impl StaticMaterials {
    pub fn new(materials: Vec<Material>) -> Self {
        Self { materials }
    }

    pub fn sample() -> Self {
        Self::new(vec![
            Material::new("mat-basics", "Crypto basics in 15 minutes")
                .with_summary("What a blockchain is, how wallets work and why keys matter.")
                .with_tags(&["basics", "beginners"])
                .for_segments(&[Segment::Cold]),
            Material::new("mat-safety", "Security checklist")
                .with_summary("Two-factor auth, cold storage and spotting scams.")
                .with_url("https://example.com/materials/security")
                .with_tags(&["safety", "risk"]),
            Material::new("mat-cases", "Trader case studies")
                .with_summary("Three students, three strategies, six months of results.")
                .with_tags(&["trading", "strategy"])
                .for_segments(&[Segment::Warm]),
            Material::new("mat-portfolio", "Building a long-term portfolio")
                .with_summary("Allocation, rebalancing and taking profit by levels.")
                .with_tags(&["investing", "portfolio"])
                .for_segments(&[Segment::Hot]),
        ])
    }

    fn push_unique(selected: &mut Vec<Material>, candidate: &Material, limit: usize) {
        if selected.len() < limit && !selected.iter().any(|material| material.id == candidate.id) {
            selected.push(candidate.clone());
        }
    }
}

#[async_trait]
impl MaterialsProvider for StaticMaterials {
    async fn materials_by_context(
        &self,
        context: &str,
        segment: &str,
        limit: usize,
    ) -> Result<Vec<Material>> {
        let tags = context_tags(context);
        let segment = segment.parse::<Segment>().ok();
        let mut selected = Vec::new();

        for material in &self.materials {
            if material.tags.iter().any(|tag| tags.contains(&tag.as_str())) {
                Self::push_unique(&mut selected, material, limit);
            }
        }
        for material in self.materials.iter().filter(|material| material.serves(segment)) {
            Self::push_unique(&mut selected, material, limit);
        }
        for material in self.materials.iter().rev() {
            Self::push_unique(&mut selected, material, limit);
        }

        debug!(
            event_name = "materials.by_context",
            tag_count = tags.len(),
            selected = selected.len(),
            "materials selected by context"
        );
        Ok(selected)
    }

    async fn materials_for_segment(&self, segment: &str, limit: usize) -> Result<Vec<Material>> {
        let segment = segment.parse::<Segment>().ok();
        Ok(self
            .materials
            .iter()
            .filter(|material| material.serves(segment))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticBonuses {
    bonuses: Vec<Material>,
}

impl StaticBonuses {
    pub fn new(bonuses: Vec<Material>) -> Self {
        Self { bonuses }
    }

    pub fn sample() -> Self {
        Self::new(vec![Material::new("bonus-guide", "Starter guide to safe investing")
            .with_summary("Twenty pages on wallets, exchanges and first purchases.")
            .with_url("https://example.com/bonus/starter-guide")])
    }
}

pub fn default_bonus_text() -> String {
    "🎁 **Your welcome bonus is on its way!**\n\nA starter guide to safe crypto investing will help you take the first steps.\n\nReady to pick a personal learning program? 🎯"
        .to_string()
}

#[async_trait]
impl BonusProvider for StaticBonuses {
    async fn welcome_bonus_text(&self) -> Result<String> {
        if self.bonuses.is_empty() {
            return Ok(default_bonus_text());
        }

        let mut lines = vec!["🎁 **Great! Here are your bonuses:**".to_string(), String::new()];
        for (index, bonus) in self.bonuses.iter().enumerate() {
            lines.push(format!("{}. **{}**", index + 1, bonus.title));
            if let Some(preview) = bonus.preview() {
                lines.push(format!("   {preview}"));
            }
            if let Some(url) = &bonus.url {
                lines.push(format!("   🔗 [Get it]({url})"));
            }
            lines.push(String::new());
        }
        lines.push("💡 *These materials help you take the first steps safely.*".to_string());
        lines.push(String::new());
        lines.push("Ready to pick a personal learning program? 🎯".to_string());
        Ok(lines.join("\n"))
    }
}

#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    products: Vec<Product>,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    pub fn sample() -> Self {
        Self::new(vec![
            Product {
                code: "START".to_string(),
                name: "Starter course".to_string(),
                price_cents: 4_900,
                description: "Self-paced basics with weekly Q&A.".to_string(),
                segments: vec![Segment::Cold],
                is_active: true,
            },
            Product {
                code: "PRO".to_string(),
                name: "Trader program".to_string(),
                price_cents: 19_900,
                description: "Strategy workshops and mentor reviews.".to_string(),
                segments: vec![Segment::Warm, Segment::Hot],
                is_active: true,
            },
            Product {
                code: "VIP".to_string(),
                name: "Private mentoring".to_string(),
                price_cents: 99_900,
                description: "One-to-one portfolio sessions.".to_string(),
                segments: vec![Segment::Hot],
                is_active: true,
            },
        ])
    }
}

#[async_trait]
impl ProductCatalog for StaticCatalog {
    /// Segment-specific products first; every active product otherwise.
    async fn suitable_products(&self, user: &User) -> Result<Vec<Product>> {
        let active = self.products.iter().filter(|product| product.is_active);
        if let Some(segment) = user.segment {
            let matching = active
                .clone()
                .filter(|product| product.segments.contains(&segment))
                .cloned()
                .collect::<Vec<_>>();
            if !matching.is_empty() {
                return Ok(matching);
            }
        }
        Ok(active.cloned().collect())
    }
}

/// Reads `<dir>/<stem>.md`, then `<dir>/<stem>.txt`. Found fragments are cached.
pub struct FilePromptLoader {
    dir: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

impl FilePromptLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cache: Mutex::new(HashMap::new()) }
    }

    fn cached(&self, stem: &str) -> Option<String> {
        match self.cache.lock() {
            Ok(cache) => cache.get(stem).cloned(),
            Err(poisoned) => poisoned.into_inner().get(stem).cloned(),
        }
    }

    fn remember(&self, stem: &str, text: &str) {
        match self.cache.lock() {
            Ok(mut cache) => cache.insert(stem.to_string(), text.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(stem.to_string(), text.to_string()),
        };
    }
}

#[async_trait]
impl PromptLoader for FilePromptLoader {
    async fn load_prompt(&self, stem: &str) -> Option<String> {
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.starts_with('.') {
            return None;
        }
        if let Some(text) = self.cached(stem) {
            return Some(text);
        }
        for extension in ["md", "txt"] {
            let path = self.dir.join(format!("{stem}.{extension}"));
            if let Ok(text) = tokio::fs::read_to_string(&path).await {
                let text = text.trim().to_string();
                self.remember(stem, &text);
                return Some(text);
            }
        }
        debug!(event_name = "prompts.missing", stem, "prompt fragment not found");
        None
    }
}

/// Loader with no fragments.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPrompts;

#[async_trait]
impl PromptLoader for NoPrompts {
    async fn load_prompt(&self, _stem: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use scenebot_core::domain::user::{Segment, User};

    use super::{
        format_materials, FilePromptLoader, Material, MaterialsProvider, ProductCatalog,
        PromptLoader, StaticCatalog, StaticMaterials,
    };

    #[tokio::test]
    async fn context_query_prefers_tags_then_segment_then_newest() {
        let provider = StaticMaterials::sample();

        let safety = provider
            .materials_by_context("how do I keep my bitcoin safety first", "warm", 2)
            .await
            .expect("context query");
        let ids = safety.iter().map(|material| material.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["mat-safety", "mat-cases"]);

        let untagged = provider.materials_by_context("engaged", "hot", 3).await.expect("fill");
        assert_eq!(untagged.len(), 3);
        assert_eq!(untagged[0].id, "mat-safety", "segment-agnostic materials serve every segment");
    }

    #[tokio::test]
    async fn segment_query_ignores_unknown_segments() {
        let provider = StaticMaterials::sample();
        let cold = provider.materials_for_segment("cold", 5).await.expect("cold query");
        assert_eq!(cold.len(), 2);
        let unknown = provider.materials_for_segment("purple", 5).await.expect("unknown query");
        assert!(unknown.is_empty());
    }

    #[test]
    fn delivery_format_numbers_titles_and_handles_empty_lists() {
        let rendered = format_materials(&[
            Material::new("a", "First").with_summary("line one\nline two"),
            Material::new("b", "Second").with_url("https://example.com/b"),
        ]);
        assert!(rendered.contains("1. **First**"));
        assert!(rendered.contains("_line one line two_"));
        assert!(rendered.contains("2. **Second**"));
        assert!(rendered.contains("(https://example.com/b)"));

        assert!(format_materials(&[]).contains("contact a manager"));
    }

    #[test]
    fn preview_is_truncated_to_limit() {
        let material = Material::new("long", "Long").with_summary("x".repeat(200));
        let preview = material.preview().expect("preview");
        assert_eq!(preview.chars().count(), 120);
        assert!(preview.ends_with("..."));
    }

    #[tokio::test]
    async fn catalog_falls_back_to_all_active_products() {
        let catalog = StaticCatalog::sample();
        let hot = catalog
            .suitable_products(&User::new(1).with_segment(Segment::Hot))
            .await
            .expect("hot products");
        assert_eq!(hot.iter().map(|p| p.code.as_str()).collect::<Vec<_>>(), vec!["PRO", "VIP"]);

        let unsegmented = catalog.suitable_products(&User::new(2)).await.expect("all products");
        assert_eq!(unsegmented.len(), 3);
    }

    #[tokio::test]
    async fn prompt_loader_reads_markdown_then_text_fragments() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("welcome.md"), "Greet warmly.\n").expect("write md");
        std::fs::write(dir.path().join("survey.txt"), "Ask one question.").expect("write txt");
        let loader = FilePromptLoader::new(dir.path());

        assert_eq!(loader.load_prompt("welcome").await.as_deref(), Some("Greet warmly."));
        assert_eq!(loader.load_prompt("survey").await.as_deref(), Some("Ask one question."));
        assert_eq!(loader.load_prompt("missing").await, None);
        assert_eq!(loader.load_prompt("../etc/passwd").await, None);
    }
}
