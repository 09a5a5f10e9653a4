use color_eyre::eyre::eyre;
use color_eyre::Result;
use dialoguer::{Confirm, Select};
use scrobble_core::RatingChoice;
use scrobble_models::Rating;

/// Prompt for yes/no with a default
pub fn prompt_yes_no(prompt: &str, default: bool) -> Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(|e| eyre!("Failed to read confirmation: {}", e))
}

/// Rating picker, best rating first, with a trailing remove option.
/// `None` when the user backs out.
pub fn select_rating(title: &str) -> Result<Option<RatingChoice>> {
    let mut labels: Vec<String> = rating_choices()
        .iter()
        .map(|rating| format!("{:>2}  {}", rating.value(), rating.description()))
        .collect();
    labels.push("Remove rating".to_string());

    let picked = Select::new()
        .with_prompt(format!("Rate {}", title))
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(|e| eyre!("Failed to read rating: {}", e))?;

    Ok(picked.map(choice_at))
}

fn rating_choices() -> Vec<Rating> {
    (1..=10).rev().filter_map(|v| Rating::new(v).ok()).collect()
}

fn choice_at(index: usize) -> RatingChoice {
    match rating_choices().get(index) {
        Some(rating) => RatingChoice::Set(*rating),
        None => RatingChoice::Remove,
    }
}

/// `--rating` value to a choice; 0 removes
pub fn parse_rating(value: u8) -> Result<RatingChoice> {
    if value == 0 {
        return Ok(RatingChoice::Remove);
    }
    Rating::new(value)
        .map(RatingChoice::Set)
        .map_err(|_| eyre!("Rating must be between 1 and 10, or 0 to remove (got {})", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picker_order() {
        assert_eq!(choice_at(0), RatingChoice::Set(Rating::new(10).unwrap()));
        assert_eq!(choice_at(9), RatingChoice::Set(Rating::new(1).unwrap()));
        assert_eq!(choice_at(10), RatingChoice::Remove);
    }

    #[test]
    fn test_parse_rating() {
        assert_eq!(parse_rating(0).unwrap(), RatingChoice::Remove);
        assert_eq!(parse_rating(7).unwrap(), RatingChoice::Set(Rating::new(7).unwrap()));
        assert!(parse_rating(11).is_err());
    }
}
