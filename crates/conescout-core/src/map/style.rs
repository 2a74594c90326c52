// Style-name derivation. Pure: the GeoServer style for a raster is fully
// determined by (raster layer, attribute, top-ten flag).

/// The attribute that shows a species' whole range.
pub const RANGE_ATTRIBUTE: &str = "Range";

/// The only attribute with a top-ten variant.
pub const RANKING_ATTRIBUTE: &str = "TotalSZEBRanking";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StyleOptions {
    pub top_ten_only: bool,
}

impl StyleOptions {
    pub fn top_ten(top_ten_only: bool) -> Self {
        Self { top_ten_only }
    }
}

/// `<layer>_range` for `Range`, otherwise `<layer>_b0_<attribute>`, with
/// `_top10` appended only for `TotalSZEBRanking` when `top_ten_only` is set.
pub fn style_name(raster_layer: &str, attribute: &str, options: StyleOptions) -> String {
    match attribute {
        RANGE_ATTRIBUTE => format!("{raster_layer}_range"),
        RANKING_ATTRIBUTE if options.top_ten_only => {
            format!("{raster_layer}_b0_{attribute}_top10")
        }
        _ => format!("{raster_layer}_b0_{attribute}"),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn range_ignores_top_ten() {
        assert_eq!(style_name("L", "Range", StyleOptions::top_ten(false)), "L_range");
        assert_eq!(style_name("L", "Range", StyleOptions::top_ten(true)), "L_range");
    }

    #[test]
    fn ranking_gets_top_ten_suffix_only_when_requested() {
        assert_eq!(
            style_name("L", "TotalSZEBRanking", StyleOptions::top_ten(false)),
            "L_b0_TotalSZEBRanking"
        );
        assert_eq!(
            style_name("L", "TotalSZEBRanking", StyleOptions::top_ten(true)),
            "L_b0_TotalSZEBRanking_top10"
        );
    }

    #[test]
    fn other_attributes_never_get_top_ten_suffix() {
        assert_eq!(
            style_name("L", "FireIntensityRiskCat", StyleOptions::top_ten(true)),
            "L_b0_FireIntensityRiskCat"
        );
    }

    #[test]
    fn same_inputs_same_output() {
        let opts = StyleOptions::top_ten(true);
        let a = style_name("SZEBxPsme_raster_4326", "TotalSZEBRanking", opts);
        let b = style_name("SZEBxPsme_raster_4326", "TotalSZEBRanking", opts);
        assert_eq!(a, b);
        assert_eq!(a, "SZEBxPsme_raster_4326_b0_TotalSZEBRanking_top10");
    }
}
