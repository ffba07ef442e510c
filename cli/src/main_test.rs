use super::*;

use time::macros::{datetime, offset};

fn message(sender: &str, text: Option<&str>, image: Option<&str>) -> client::net::types::Message {
    let at = datetime!(2025-01-05 09:07 UTC);
    client::net::types::Message {
        id: "m1".to_owned(),
        sender_id: sender.to_owned(),
        receiver_id: "u2".to_owned(),
        text: text.map(str::to_owned),
        image: image.map(str::to_owned),
        created_at: at,
        updated_at: at,
        read: false,
        read_at: None,
        client_message_id: None,
    }
}

#[test]
fn parse_input_recognizes_commands() {
    assert_eq!(parse_input("/quit"), Input::Quit);
    assert_eq!(parse_input("  /exit  "), Input::Quit);
    assert_eq!(parse_input("/typing"), Input::Typing);
    assert_eq!(parse_input("/stop"), Input::StopTyping);
    assert_eq!(parse_input("/reload"), Input::Reload);
    assert_eq!(parse_input("/image ./cat.png"), Input::Image(PathBuf::from("./cat.png")));
    assert_eq!(parse_input("   "), Input::Blank);
}

#[test]
fn parse_input_treats_everything_else_as_text() {
    assert_eq!(parse_input("hello there"), Input::Text("hello there".to_owned()));
    assert_eq!(parse_input("/image"), Input::Text("/image".to_owned()));
    assert_eq!(parse_input("/shrug ok"), Input::Text("/shrug ok".to_owned()));
}

#[test]
fn render_line_uses_names_and_marks_pending() {
    let mut names = HashMap::new();
    names.insert("u1".to_owned(), "you".to_owned());

    let line = render_line(&names, &message("u1", Some("hi"), None), offset!(UTC), true);
    assert_eq!(line, "[09:07] you: hi (sending)");

    let line = render_line(&names, &message("u9", None, Some("data:image/png;base64,AA")), offset!(+1), false);
    assert_eq!(line, "[10:07] u9: [image]");
}

#[test]
fn display_names_label_self() {
    let me = User {
        id: "u1".to_owned(),
        first_name: "Ada".to_owned(),
        last_name: "Lovelace".to_owned(),
        email: String::new(),
        profile_pic: None,
    };
    let other = User { id: "u2".to_owned(), first_name: "Bob".to_owned(), ..me.clone() };
    let names = display_names(&me, &[me.clone(), other]);
    assert_eq!(names["u1"], "you");
    assert_eq!(names["u2"], "Bob Lovelace");
}

#[test]
fn send_is_followed_by_stop_typing() {
    let batch = send_intents("u2", Some("hi".to_owned()), None);
    assert_eq!(batch.len(), 2);
    assert!(matches!(
        &batch[0],
        Intent::Send { receiver_id, text: Some(text), image: None } if receiver_id == "u2" && text == "hi"
    ));
    assert!(matches!(&batch[1], Intent::StopTyping { receiver_id } if receiver_id == "u2"));
}

#[test]
fn image_send_also_stops_typing() {
    let batch = send_intents("u2", None, Some("data:image/png;base64,AA".to_owned()));
    assert!(matches!(&batch[0], Intent::Send { text: None, image: Some(_), .. }));
    assert!(matches!(&batch[1], Intent::StopTyping { .. }));
}

#[test]
fn retry_prompt_defaults_to_yes() {
    assert!(wants_retry(""));
    assert!(wants_retry("y\n"));
    assert!(wants_retry(" YES "));
    assert!(!wants_retry("n"));
    assert!(!wants_retry("no"));
}
