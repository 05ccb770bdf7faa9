//! Cached birthday list.
//!
//! The upstream source is slow and rarely changes, so the daemon refreshes
//! this cache on a long interval (48h by default) and the daily scan reads
//! only the cache. The refresh is lock-guarded in the daemon so multiple bot
//! processes do not hammer the source at once.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tokio::sync::RwLock;
use tracing::info;

use quorum_chat::{BirthdaySource, ChatError, Person};

pub struct BirthdayBook {
    source: Arc<dyn BirthdaySource>,
    people: RwLock<Vec<Person>>,
}

impl BirthdayBook {
    pub fn new(source: Arc<dyn BirthdaySource>) -> Self {
        Self {
            source,
            people: RwLock::new(Vec::new()),
        }
    }

    /// Re-pull the list from the upstream source, replacing the cache.
    /// Returns how many rows are now cached.
    pub async fn refresh(&self) -> Result<usize, ChatError> {
        let mut fresh = self.source.fetch_all().await?;
        // Calendar order; rows without a date sink to the end.
        fresh.sort_by_key(|p| match p.born {
            Some(date) => (0, date.month(), date.day()),
            None => (1, 0, 0),
        });
        let count = fresh.len();
        *self.people.write().await = fresh;
        info!(count, "birthday list refreshed");
        Ok(count)
    }

    /// Everyone whose month and day match `today`, with the age they turn.
    ///
    /// Matching ignores the year, and the age is the plain year difference,
    /// so a leap-day birthday is only announced on Feb 29.
    pub async fn due_today(&self, today: NaiveDate) -> Vec<(String, i32)> {
        self.people
            .read()
            .await
            .iter()
            .filter_map(|person| {
                let born = person.born?;
                (born.month() == today.month() && born.day() == today.day())
                    .then(|| (person.name.clone(), today.year() - born.year()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedSource(Vec<Person>);

    #[async_trait]
    impl BirthdaySource for FixedSource {
        async fn fetch_all(&self) -> Result<Vec<Person>, ChatError> {
            Ok(self.0.clone())
        }
    }

    fn person(name: &str, born: Option<(i32, u32, u32)>) -> Person {
        Person {
            name: name.to_string(),
            born: born.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
        }
    }

    fn book(people: Vec<Person>) -> BirthdayBook {
        BirthdayBook::new(Arc::new(FixedSource(people)))
    }

    #[tokio::test]
    async fn empty_until_refreshed() {
        let book = book(vec![person("Ada", Some((1990, 6, 15)))]);
        let today = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();

        assert!(book.due_today(today).await.is_empty());
        assert_eq!(book.refresh().await.unwrap(), 1);
        assert_eq!(book.due_today(today).await, vec![("Ada".to_string(), 36)]);
    }

    #[tokio::test]
    async fn matches_month_and_day_ignoring_year() {
        let book = book(vec![
            person("Ada", Some((1990, 6, 15))),
            person("Grace", Some((1984, 6, 15))),
            person("Alan", Some((1991, 6, 16))),
            person("Undated", None),
        ]);
        book.refresh().await.unwrap();

        let due = book
            .due_today(NaiveDate::from_ymd_opt(2026, 6, 15).unwrap())
            .await;

        // Ages are computed per person, independently.
        assert_eq!(
            due,
            vec![("Ada".to_string(), 36), ("Grace".to_string(), 42)]
        );
    }

    #[tokio::test]
    async fn no_birthdays_is_an_empty_list() {
        let book = book(vec![person("Ada", Some((1990, 6, 15)))]);
        book.refresh().await.unwrap();

        let due = book
            .due_today(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
            .await;
        assert!(due.is_empty());
    }

    #[tokio::test]
    async fn leap_day_birthday_only_matches_leap_years() {
        let book = book(vec![person("Leap", Some((2000, 2, 29)))]);
        book.refresh().await.unwrap();

        let leap = NaiveDate::from_ymd_opt(2028, 2, 29).unwrap();
        assert_eq!(book.due_today(leap).await, vec![("Leap".to_string(), 28)]);

        let non_leap = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert!(book.due_today(non_leap).await.is_empty());
        let non_leap_march = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(book.due_today(non_leap_march).await.is_empty());
    }

    #[tokio::test]
    async fn refresh_replaces_rather_than_appends() {
        let source = Arc::new(FixedSource(vec![person("Ada", Some((1990, 6, 15)))]));
        let book = BirthdayBook::new(source);
        book.refresh().await.unwrap();
        assert_eq!(book.refresh().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn refresh_sorts_undated_rows_last() {
        let book = book(vec![
            person("Undated", None),
            person("Ada", Some((1990, 6, 15))),
        ]);
        assert_eq!(book.refresh().await.unwrap(), 2);
        let people = book.people.read().await;
        assert_eq!(people[0].name, "Ada");
        assert_eq!(people[1].name, "Undated");
    }
}
