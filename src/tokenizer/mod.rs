pub mod ngram_filter;

pub use ngram_filter::NgramTokenFilter;

use tantivy::tokenizer::{LowerCaser, RawTokenizer, SimpleTokenizer, TextAnalyzer, TokenStream};

/// Whole value, lowercased, split into every infix n-gram.
pub const SUBSTRING: &str = "substring";
/// Words, lowercased, split into prefix n-grams.
pub const EDGE_NGRAM_LOWER: &str = "edge_ngram_lower";
/// Whole value, lowercased.
pub const RAW_LOWER: &str = "raw_lower";

/// Analyzers are not persisted by tantivy, so every opened index needs them
/// registered again before it can index or search.
pub fn register_analyzers(index: &tantivy::Index, min_gram: usize, max_gram: usize) {
    let manager = index.tokenizers();
    manager.register(
        SUBSTRING,
        TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .filter(NgramTokenFilter::infix(min_gram, max_gram))
            .build(),
    );
    manager.register(
        EDGE_NGRAM_LOWER,
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(LowerCaser)
            .filter(NgramTokenFilter::edge(1, max_gram))
            .build(),
    );
    manager.register(
        RAW_LOWER,
        TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .build(),
    );
}

/// Splits free text the same way the content field was indexed, without
/// the n-gram step.
pub fn content_terms(text: &str) -> Vec<String> {
    let mut analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build();
    let mut stream = analyzer.token_stream(text);
    let mut terms = Vec::new();
    while stream.advance() {
        terms.push(stream.token().text.clone());
    }
    terms
}
