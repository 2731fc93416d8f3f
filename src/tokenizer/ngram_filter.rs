use tantivy::tokenizer::{Token, TokenFilter, TokenStream, Tokenizer};

/// Emits character n-grams of every incoming token.
///
/// In edge mode only grams anchored at the first character are produced
/// (prefix matching). In infix mode every substring of `min_gram..=max_gram`
/// characters is produced, which turns substring search into a single term
/// lookup.
#[derive(Clone)]
pub struct NgramTokenFilter {
    min_gram: usize,
    max_gram: usize,
    edges_only: bool,
}

impl NgramTokenFilter {
    pub fn edge(min_gram: usize, max_gram: usize) -> Self {
        NgramTokenFilter {
            min_gram: min_gram.max(1),
            max_gram,
            edges_only: true,
        }
    }

    pub fn infix(min_gram: usize, max_gram: usize) -> Self {
        NgramTokenFilter {
            min_gram: min_gram.max(1),
            max_gram,
            edges_only: false,
        }
    }
}

impl TokenFilter for NgramTokenFilter {
    type Tokenizer<T: Tokenizer> = NgramFilterWrapper<T>;

    fn transform<T: Tokenizer>(self, tokenizer: T) -> Self::Tokenizer<T> {
        NgramFilterWrapper {
            inner: tokenizer,
            min_gram: self.min_gram,
            max_gram: self.max_gram,
            edges_only: self.edges_only,
        }
    }
}

#[derive(Clone)]
pub struct NgramFilterWrapper<T> {
    inner: T,
    min_gram: usize,
    max_gram: usize,
    edges_only: bool,
}

impl<T: Tokenizer> Tokenizer for NgramFilterWrapper<T> {
    type TokenStream<'a> = NgramTokenStream<T::TokenStream<'a>>;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> Self::TokenStream<'a> {
        NgramTokenStream {
            inner: self.inner.token_stream(text),
            min_gram: self.min_gram,
            max_gram: self.max_gram,
            edges_only: self.edges_only,
            current_token: None,
            boundaries: Vec::new(),
            start: 0,
            gram_len: 0,
            ngram_token: Token::default(),
        }
    }
}

pub struct NgramTokenStream<T> {
    inner: T,
    min_gram: usize,
    max_gram: usize,
    edges_only: bool,
    current_token: Option<Token>,
    // byte offset of every char start, plus the text length
    boundaries: Vec<usize>,
    start: usize,
    gram_len: usize,
    ngram_token: Token,
}

impl<T: TokenStream> TokenStream for NgramTokenStream<T> {
    fn advance(&mut self) -> bool {
        loop {
            if let Some(ref token) = self.current_token {
                let char_count = self.boundaries.len() - 1;
                while self.start < char_count {
                    if self.gram_len <= self.max_gram && self.start + self.gram_len <= char_count
                    {
                        let from = self.boundaries[self.start];
                        let to = self.boundaries[self.start + self.gram_len];
                        self.ngram_token = token.clone();
                        self.ngram_token.text.clear();
                        self.ngram_token.text.push_str(&token.text[from..to]);
                        self.ngram_token.offset_from = token.offset_from + from;
                        self.ngram_token.offset_to = token.offset_from + to;

                        self.gram_len += 1;
                        return true;
                    }
                    if self.edges_only {
                        break;
                    }
                    self.start += 1;
                    self.gram_len = self.min_gram;
                }

                self.current_token = None;
            }

            if !self.inner.advance() {
                return false;
            }

            let token = self.inner.token().clone();
            self.boundaries.clear();
            self.boundaries
                .extend(token.text.char_indices().map(|(idx, _)| idx));
            self.boundaries.push(token.text.len());
            self.start = 0;
            self.gram_len = self.min_gram;
            self.current_token = Some(token);
        }
    }

    fn token(&self) -> &Token {
        &self.ngram_token
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.ngram_token
    }
}
