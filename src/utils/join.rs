use std::fmt::{Display, Write};

pub(crate) trait Join<Item: Display>: Iterator<Item = Item> {
    fn join(&mut self, sep: &str) -> String {
        let mut result = String::new();
        if let Some(first) = self.next() {
            let _ = write!(result, "{first}");
            for item in self {
                result.push_str(sep);
                let _ = write!(result, "{item}");
            }
        }
        result
    }
}

impl<T: ?Sized, Item: Display> Join<Item> for T where T: Iterator<Item = Item> {}
