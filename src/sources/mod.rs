pub mod dataset;
pub mod directory;
pub mod http;
pub mod qs;
pub mod scorecard;
pub mod the_rankings;
pub mod wikipedia;

/// Stock description attached to rows seeded from ranking tables, using the
/// raw location string as printed in the source file.
pub fn generated_description(name: &str, location: &str) -> String {
    format!("{name} is a higher education institution in {location}.")
}
