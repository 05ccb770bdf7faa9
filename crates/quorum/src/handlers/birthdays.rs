//! Daily birthday scan.

use chrono::Local;

use quorum_chat::{ChannelId, ChatGateway};

use crate::birthdays::BirthdayBook;

/// Announce everyone whose birthday is today, in one message.
///
/// A day with no birthdays is a successful no-op. The scan reads the cached
/// list only; refreshing it is the refresh task's business.
pub(crate) async fn check_birthdays(
    gateway: &dyn ChatGateway,
    book: &BirthdayBook,
    channel: &ChannelId,
) -> Result<(), String> {
    let today = Local::now().date_naive();
    let due = book.due_today(today).await;
    if due.is_empty() {
        return Ok(());
    }

    let names: Vec<&str> = due.iter().map(|(name, _)| name.as_str()).collect();
    let mut message = format!("Happy birthday to {}!\n", names.join(", "));
    for (name, age) in &due {
        message.push_str(&format!("{name} turns {age} today\n"));
    }

    let Some(dest) = gateway.resolve(channel).await.map_err(|e| e.to_string())? else {
        return Err(format!("announcement channel {channel} does not exist"));
    };
    gateway.send(&dest, &message).await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Datelike, NaiveDate};

    use quorum_chat::{BirthdaySource, ChatError, Person};

    use crate::testutil::MockGateway;

    struct FixedSource(Vec<Person>);

    #[async_trait]
    impl BirthdaySource for FixedSource {
        async fn fetch_all(&self) -> Result<Vec<Person>, ChatError> {
            Ok(self.0.clone())
        }
    }

    async fn book_with(people: Vec<(&str, (i32, u32, u32))>) -> BirthdayBook {
        let people = people
            .into_iter()
            .map(|(name, (y, m, d))| Person {
                name: name.to_string(),
                born: NaiveDate::from_ymd_opt(y, m, d),
            })
            .collect();
        let book = BirthdayBook::new(Arc::new(FixedSource(people)));
        book.refresh().await.unwrap();
        book
    }

    #[tokio::test]
    async fn shared_birthdays_get_one_combined_announcement() {
        let today = Local::now().date_naive();
        let gateway = MockGateway::new();
        // Leap birth years, so the fixture stays valid even on Feb 29.
        let book = book_with(vec![
            ("Ada", (1992, today.month(), today.day())),
            ("Grace", (1984, today.month(), today.day())),
        ])
        .await;

        check_birthdays(&gateway, &book, &ChannelId::from("announcements"))
            .await
            .unwrap();

        let sent = gateway.sent_texts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Ada, Grace"));
        assert!(sent[0].contains(&format!("Ada turns {}", today.year() - 1992)));
        assert!(sent[0].contains(&format!("Grace turns {}", today.year() - 1984)));
    }

    #[tokio::test]
    async fn a_day_without_birthdays_is_silent() {
        let today = Local::now().date_naive();
        let other_month = if today.month() == 1 { 2 } else { 1 };
        let gateway = MockGateway::new();
        let book = book_with(vec![("Ada", (1990, other_month, 15))]).await;

        check_birthdays(&gateway, &book, &ChannelId::from("announcements"))
            .await
            .unwrap();
        assert!(gateway.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn missing_announcement_channel_is_a_handler_error() {
        let today = Local::now().date_naive();
        let gateway = MockGateway::new();
        gateway.delete_channel("announcements");
        let book = book_with(vec![("Ada", (1992, today.month(), today.day()))]).await;

        let error = check_birthdays(&gateway, &book, &ChannelId::from("announcements"))
            .await
            .unwrap_err();
        assert!(error.contains("announcements"));
    }
}
