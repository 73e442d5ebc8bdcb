//! Prompt templates for the retrieval workflow
//!
//! Templates use `{query}` / `{context}` placeholders filled with
//! simple string replacement.

/// Classify a query as research_question or data_lookup
pub const QUERY_TYPE_PROMPT: &str = "\
Classify this query as either \"research_question\" or \"data_lookup\".

- research_question: Questions about concepts, interpretations, relationships, causes/effects
- data_lookup: Requests for specific metrics, thresholds, numbers, or exact data points

Query: {query}

Respond with only: research_question or data_lookup";

/// Expand a query into labeled variants approaching it from
/// different semantic angles
pub const QUERY_EXPANSION_PROMPT: &str = "\
You are a query expansion engine for a financial/economic research database.

Your task: Generate search queries that approach the question from different angles.

## Guidelines
- Stay CLOSE to the original query - small variations, not big tangents
- Use concrete market terms: \"equities\", \"stocks\", \"rate cuts\", \"Fed balance sheet\" - not academic jargon
- Each query should be recognizable as related to the original question
- Keep queries simple and searchable

## Think About
- What directly vs indirectly relates to this?
- What precedes, coincides with, or follows from this?
- What causes this vs what results from it?

Generate 4-6 query variations.

Original query: {query}

## Output Format
DIMENSION: [short name for this angle]
REASONING: [one sentence - why this angle matters]
QUERY: [the search query]

(repeat for each)";

/// Extract and connect causal chains from retrieved context
pub const CAUSAL_CHAIN_PROMPT: &str = "\
You are analyzing financial research to extract causal chains relevant to a query.

Query: {query}

Research Context:
{context}

Instructions:
1. Identify causal chains (cause -> effect relationships) relevant to the query
2. Connect chains where one chain's effect matches another's cause to form longer sequences
3. Use the interpretation/what_happened context to supplement chain understanding
4. Output as structured list only - no narrative summary

Output Format:
CHAIN: cause -> effect -> [next effect if connected]
MECHANISM: mechanism for each step
SOURCE: which source(s) support this chain

Example:
CHAIN: Fed rate cuts -> real rates down -> risk asset valuations up
MECHANISM: rate cuts reduce yields -> lower real yields increase present value of future cash flows
SOURCE: Goldman Sachs, UBS";
