use anyhow::Result;
use clap::Args;
use facedash_core::{Gender, NewProfile, NewsCategory, Profile, ProfileStore, Settings};

use crate::capture::{CaptureArgs, CaptureOptions};

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Person's name (must be unique)
    #[arg(short, long)]
    pub name: String,
    #[arg(short, long)]
    pub age: i64,
    /// Male, Female or Other
    #[arg(short, long)]
    pub gender: Gender,
    /// News categories to follow (Sports, Politics, Business, Science)
    #[arg(long, num_args = 1..)]
    pub news: Vec<NewsCategory>,
    /// Stock tickers to follow
    #[arg(long, num_args = 1..)]
    pub stocks: Vec<String>,
    /// To-do items
    #[arg(long, num_args = 1..)]
    pub todo: Vec<String>,
    /// Start enrollment capture for this person right away
    #[arg(long)]
    pub capture: bool,
    #[command(flatten)]
    pub capture_options: CaptureOptions,
}

impl RegisterArgs {
    pub fn to_new_profile(&self) -> NewProfile {
        NewProfile {
            name: self.name.clone(),
            age: self.age,
            gender: self.gender,
            news_interest: !self.news.is_empty(),
            news_categories: self.news.clone(),
            stock_interest: !self.stocks.is_empty(),
            stock_tickers: self.stocks.clone(),
            todo_list: self.todo.clone(),
        }
    }

    /// Capture settings for `--capture`, targeting the person just registered.
    pub fn capture_args(&self, profile: &Profile) -> CaptureArgs {
        CaptureArgs {
            name: Some(profile.name.clone()),
            options: self.capture_options.clone(),
        }
    }
}

/// Validate and store the profile. Nothing is written on error.
pub fn run(settings: &Settings, args: &RegisterArgs) -> Result<Profile> {
    let store = ProfileStore::open(settings.people_path());
    let profile = store.add(args.to_new_profile())?;
    println!(
        "Registered {} ({} profile(s) in {})",
        profile.name,
        store.load()?.len(),
        store.path().display()
    );
    Ok(profile)
}

/// `facedash people list`: profiles plus how many gallery entries each has.
pub fn list(settings: &Settings) -> Result<()> {
    let profiles = ProfileStore::open(settings.people_path()).load()?;
    let gallery = match facedash_core::Gallery::load(&settings.gallery_path()) {
        Ok(g) => g,
        Err(facedash_core::gallery::GalleryError::NotFound(_)) => facedash_core::Gallery::new(),
        Err(e) => return Err(e.into()),
    };
    let counts = gallery.counts();

    if profiles.is_empty() {
        println!("No people registered");
        return Ok(());
    }
    for p in &profiles {
        let encodings = counts
            .iter()
            .find(|(name, _)| *name == p.name)
            .map(|(_, n)| *n)
            .unwrap_or(0);
        println!(
            "{:<20} {:>3}  {:<6}  {} encoding(s)",
            p.name, p.age, p.gender, encodings
        );
    }
    Ok(())
}

pub fn remove(settings: &Settings, name: &str) -> Result<()> {
    let removed = ProfileStore::open(settings.people_path()).remove(name)?;
    println!("Removed {}", removed.name);
    println!("Run `facedash encode` after deleting their images to drop them from the gallery.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::Path;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: RegisterArgs,
    }

    fn settings(dir: &Path) -> Settings {
        Settings {
            data_dir: dir.to_path_buf(),
            model_dir: dir.join("models"),
            match_distance: 1.1,
            detection_confidence: 0.5,
        }
    }

    #[test]
    fn test_parse_flags() {
        let h = Harness::try_parse_from([
            "register", "--name", "Ada", "--age", "36", "--gender", "female", "--news",
            "Science", "business", "--stocks", "aapl", "msft", "--todo", "water plants",
        ])
        .unwrap();
        let new = h.args.to_new_profile();
        assert_eq!(new.gender, Gender::Female);
        assert!(new.news_interest);
        assert_eq!(
            new.news_categories,
            vec![NewsCategory::Science, NewsCategory::Business]
        );
        assert!(new.stock_interest);
        assert_eq!(new.todo_list, vec!["water plants"]);
        assert!(!h.args.capture);
    }

    #[test]
    fn test_interest_flags_follow_lists() {
        let h = Harness::try_parse_from([
            "register", "--name", "Bo", "--age", "9", "--gender", "Other",
        ])
        .unwrap();
        let new = h.args.to_new_profile();
        assert!(!new.news_interest);
        assert!(!new.stock_interest);
    }

    #[test]
    fn test_unknown_category_rejected() {
        assert!(Harness::try_parse_from([
            "register", "--name", "Bo", "--age", "9", "--gender", "Other", "--news", "Weather",
        ])
        .is_err());
    }

    #[test]
    fn test_duplicate_name_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let first = Harness::try_parse_from([
            "register", "--name", "Ada", "--age", "36", "--gender", "Female",
        ])
        .unwrap();
        run(&settings, &first.args).unwrap();
        let before = std::fs::read_to_string(settings.people_path()).unwrap();

        let dup = Harness::try_parse_from([
            "register", "--name", " ada ", "--age", "40", "--gender", "Male",
        ])
        .unwrap();
        assert!(run(&settings, &dup.args).is_err());
        assert_eq!(std::fs::read_to_string(settings.people_path()).unwrap(), before);
    }

    #[test]
    fn test_capture_flags_reach_capture() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let h = Harness::try_parse_from([
            "register", "--name", "Ada", "--age", "36", "--gender", "Female", "--capture",
            "--device", "/dev/video2", "--count", "10",
        ])
        .unwrap();
        assert!(h.args.capture);
        let profile = run(&settings, &h.args).unwrap();
        let capture = h.args.capture_args(&profile);
        assert_eq!(capture.name.as_deref(), Some("Ada"));
        assert_eq!(capture.options.device, "/dev/video2");
        assert_eq!(capture.options.count, 10);
        assert_eq!(capture.options.interval_ms, 400);
        assert!(!capture.options.no_encode);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let h = Harness::try_parse_from([
            "register", "--name", "Ada", "--age", "36", "--gender", "Female",
        ])
        .unwrap();
        run(&settings, &h.args).unwrap();
        remove(&settings, "ADA").unwrap();
        assert!(ProfileStore::open(settings.people_path()).load().unwrap().is_empty());
        assert!(remove(&settings, "Ada").is_err());
    }
}
