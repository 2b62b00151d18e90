//! Quotes Demo - page objects against a live site
//!
//! Reads the first pages of quotes.toscrape.com through derived containers,
//! then follows the login link and fills the form.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=domap=debug cargo run --example quotes -p domap --features browser
//! ```
//!
//! Set `CHROMIUM_PATH` when chromium is not on the default search path.

#![allow(clippy::uninlined_format_args, clippy::print_stdout)]

use std::rc::Rc;

use domap::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Container)]
#[dom(component)]
struct Author {
    #[dom(css = "small.author")]
    name: String,
    #[dom(css = "a[href^='/author/']", attribute = "href")]
    about: Link,
}

#[derive(Container)]
#[dom(component)]
struct Quote {
    #[dom(css = "span.text")]
    text: String,
    #[dom(css = ":scope > span:nth-of-type(2)")]
    author: Author,
    #[dom(css = "a.tag", default = Vec::<String>::new())]
    tags: Vec<String>,
}

#[derive(Container)]
#[dom(page, url = "https://quotes.toscrape.com/page/{page}/")]
struct QuotesPage {
    #[dom(css = "div.quote", wait = 5)]
    quotes: Vec<Quote>,
    #[dom(css = "li.next > a", default = None::<String>)]
    next: Option<Link>,
    #[dom(link_text = "Login")]
    login: Element,
}

#[derive(Container)]
#[dom(form)]
struct LoginForm {
    #[dom(css = "#username")]
    username: InputValue,
    #[dom(css = "#password")]
    password: InputValue,
}

#[derive(Container)]
#[dom(page, url = "https://quotes.toscrape.com/login")]
struct LoginPage {
    #[dom(css = "form", wait = 5)]
    form: LoginForm,
}

fn main() -> DomapResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let browser = ChromiumSession::launch(BrowserConfig::from_env().with_no_sandbox())?;
    let session: Rc<dyn Session> = Rc::new(browser);

    println!("=== domap Quotes Demo ===\n");

    let page = Area::<QuotesPage>::new(Rc::clone(&session))?;
    for number in ["1", "2"] {
        page.open(&[("page", number)])?;
        println!("--- {} ---", page.title()?);
        for quote in page.quotes()? {
            let author = quote.author()?;
            println!("{}", quote.text()?);
            println!("    by {} ({})", author.name()?, author.about()?);
            println!("    tags: {}", quote.tags()?.join(", "));
        }
        println!("next page: {:?}\n", page.next()?);
    }

    println!("login link node: {}", page.login()?);

    let login = Area::<LoginPage>::new(Rc::clone(&session))?;
    login.open(&[])?;
    let form = login.form()?;
    form.set_username("demo")?;
    form.set_password("secret")?;
    form.submit()?;
    println!("after login: {}", login.current_url()?);

    println!("\n=== Quotes Demo Complete ===");
    Ok(())
}
